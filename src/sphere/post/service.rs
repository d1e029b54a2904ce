//! 帖子服务层
//!
//! 发帖（可带配图）、编辑、点赞切换、级联删除、评论增删

use crate::sphere::auth::Principal;
use crate::sphere::error::SphereError;
use crate::sphere::post::blob::{post_image_path, BlobStore};
use crate::sphere::post::dao::PostDao;
use crate::sphere::post::models::{Comment, NewPost, Post};
use crate::sphere::types::{generate_doc_id, now_millis, require_text};
use crate::sphere::user::UserDao;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct PostService {
    post_dao: PostDao,
    user_dao: UserDao,
    blobs: Arc<dyn BlobStore>,
}

impl PostService {
    pub fn new(db: Pool<Sqlite>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            post_dao: PostDao::new(db.clone()),
            user_dao: UserDao::new(db),
            blobs,
        }
    }

    /// 发帖：先上传配图，再写入帖子文档
    ///
    /// 写入失败时删除已上传的配图，删除失败只记日志。
    pub async fn create_post(&self, principal: &Principal, new_post: NewPost) -> Result<Post> {
        let title = require_text("title", &new_post.title)?;
        let content = require_text("content", &new_post.content)?;
        let now = now_millis();

        let mut uploaded_path = None;
        let mut photo_url = String::new();
        if let Some(image) = new_post.image {
            let path = post_image_path(&principal.uid, now, &image.file_name);
            photo_url = self
                .blobs
                .upload(&path, &image.bytes)
                .await
                .map_err(|e| SphereError::Blob(format!("{:#}", e)))?;
            uploaded_path = Some(path);
        }

        let post = Post {
            post_id: generate_doc_id(),
            owner_uid: principal.uid.clone(),
            title,
            content,
            photo_url,
            likes: Vec::new(),
            create_time: now,
        };

        if let Err(e) = self.post_dao.insert_post(&post).await {
            error!("[PostService] 写入帖子失败: {:#}", e);
            if let Some(path) = uploaded_path {
                if let Err(cleanup) = self.blobs.delete(&path).await {
                    warn!("[PostService] 清理孤立配图 {} 失败: {:#}", path, cleanup);
                }
            }
            return Err(e);
        }

        info!("[PostService] 📝 用户 {} 发布帖子 {}", principal.uid, post.post_id);
        self.refresh_post_count(&principal.uid).await;
        Ok(post)
    }

    /// 编辑自己帖子的标题和正文
    pub async fn update_post(
        &self,
        principal: &Principal,
        post_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Post> {
        let mut post = self.owned_post(principal, post_id).await?;
        post.title = require_text("title", title)?;
        post.content = require_text("content", content)?;
        self.post_dao
            .update_post_text(post_id, &post.title, &post.content)
            .await?;
        post.likes = self.post_dao.list_likes(post_id).await?;
        Ok(post)
    }

    /// 查询帖子（含点赞集合）
    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        let mut post = self
            .post_dao
            .get_post(post_id)
            .await?
            .ok_or_else(|| SphereError::not_found("post", post_id))?;
        post.likes = self.post_dao.list_likes(post_id).await?;
        Ok(post)
    }

    /// 点赞 / 取消点赞，返回切换后的点赞集合
    pub async fn toggle_like(&self, principal: &Principal, post_id: &str) -> Result<Vec<String>> {
        if self.post_dao.get_post(post_id).await?.is_none() {
            return Err(SphereError::not_found("post", post_id).into());
        }
        let likes = self
            .post_dao
            .toggle_like(post_id, &principal.uid, now_millis())
            .await?;
        info!(
            "[PostService] ❤️ 用户 {} 切换点赞 {}，当前 {} 个赞",
            principal.uid,
            post_id,
            likes.len()
        );
        Ok(likes)
    }

    /// 删除自己的帖子，评论和点赞一并删除
    pub async fn delete_post(&self, principal: &Principal, post_id: &str) -> Result<()> {
        self.owned_post(principal, post_id).await?;
        let deleted = self.post_dao.delete_post_cascade(post_id).await?;
        info!(
            "[PostService] 🗑️ 用户 {} 删除帖子 {}（{} 条评论）",
            principal.uid, post_id, deleted.comments
        );
        self.refresh_post_count(&principal.uid).await;
        Ok(())
    }

    /// 发表评论；作者名取昵称、邮箱或 "Anonymous"
    pub async fn add_comment(&self, principal: &Principal, post_id: &str, text: &str) -> Result<Comment> {
        let text = require_text("comment", text)?;
        if self.post_dao.get_post(post_id).await?.is_none() {
            return Err(SphereError::not_found("post", post_id).into());
        }
        let comment = Comment {
            comment_id: generate_doc_id(),
            post_id: post_id.to_string(),
            author_uid: principal.uid.clone(),
            author_name: principal.author_name(),
            text,
            create_time: now_millis(),
        };
        self.post_dao.insert_comment(&comment).await?;
        info!("[PostService] 💬 用户 {} 评论帖子 {}", principal.uid, post_id);
        Ok(comment)
    }

    /// 删除评论，仅评论作者可操作
    pub async fn delete_comment(&self, principal: &Principal, comment_id: &str) -> Result<()> {
        let comment = self
            .post_dao
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| SphereError::not_found("comment", comment_id))?;
        if comment.author_uid != principal.uid {
            return Err(SphereError::Forbidden("只能删除自己的评论".into()).into());
        }
        self.post_dao.delete_comment(comment_id).await?;
        Ok(())
    }

    async fn owned_post(&self, principal: &Principal, post_id: &str) -> Result<Post> {
        let post = self
            .post_dao
            .get_post(post_id)
            .await?
            .ok_or_else(|| SphereError::not_found("post", post_id))?;
        if post.owner_uid != principal.uid {
            return Err(SphereError::Forbidden("只能修改自己的帖子".into()).into());
        }
        Ok(post)
    }

    /// 帖子写入已经提交，计数更新失败只记录日志，下次发帖或删帖时会重新统计
    async fn refresh_post_count(&self, uid: &str) {
        if let Err(e) = self.try_refresh_post_count(uid).await {
            warn!("[PostService] 更新用户 {} 的帖子计数失败: {:#}", uid, e);
        }
    }

    async fn try_refresh_post_count(&self, uid: &str) -> Result<()> {
        let count = self.post_dao.count_posts(uid).await?;
        if let Some(user) = self.user_dao.get_user(uid).await? {
            let mut stats = user.stats;
            stats.posts = count;
            self.user_dao.set_stats(uid, &stats).await?;
        }
        Ok(())
    }
}
