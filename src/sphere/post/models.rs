//! 帖子与评论模型

use serde::{Deserialize, Serialize};

/// 帖子（users/{uid}/posts/{postId}）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub post_id: String,
    #[serde(rename = "userId")]
    pub owner_uid: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    /// 点赞用户集合，顺序无意义
    pub likes: Vec<String>,
    pub create_time: i64,
}

/// 评论（.../posts/{postId}/comments/{commentId}）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub comment_id: String,
    pub post_id: String,
    #[serde(rename = "authorId")]
    pub author_uid: String,
    #[serde(rename = "author")]
    pub author_name: String,
    pub text: String,
    pub create_time: i64,
}

/// 帖子配图
#[derive(Debug, Clone)]
pub struct PostImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// 发帖参数
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image: Option<PostImage>,
}
