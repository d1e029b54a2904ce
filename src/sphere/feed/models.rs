//! 动态流条目

use crate::sphere::post::{Comment, Post};
use serde::{Deserialize, Serialize};

/// 带作者信息和评论的帖子
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    pub post_id: String,
    #[serde(rename = "userId")]
    pub owner_uid: String,
    #[serde(rename = "author")]
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub likes: Vec<String>,
    pub comments: Vec<Comment>,
    pub create_time: i64,
}

impl FeedPost {
    pub(crate) fn from_post(post: Post, author_name: String, author_avatar: Option<String>) -> Self {
        Self {
            post_id: post.post_id,
            owner_uid: post.owner_uid,
            author_name,
            author_avatar,
            title: post.title,
            content: post.content,
            photo_url: post.photo_url,
            likes: post.likes,
            comments: Vec::new(),
            create_time: post.create_time,
        }
    }

    pub fn liked_by(&self, uid: &str) -> bool {
        self.likes.iter().any(|u| u == uid)
    }
}
