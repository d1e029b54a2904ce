//! 帖子数据访问层（DAO）
//!
//! 点赞切换、级联删除帖子在事务中完成。

use crate::sphere::post::models::{Comment, Post};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// 帖子 DAO（基于 sqlx）
#[derive(Clone)]
pub struct PostDao {
    db: Pool<Sqlite>,
}

/// 级联删除的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeDeleted {
    pub comments: u64,
    pub likes: u64,
    pub posts: u64,
}

fn row_to_comment(row: &SqliteRow) -> Comment {
    Comment {
        comment_id: row.get("comment_id"),
        post_id: row.get("post_id"),
        author_uid: row.get("author_uid"),
        author_name: row.get("author_name"),
        text: row.get("text"),
        create_time: row.get("create_time"),
    }
}

async fn likes_in(conn: &mut SqliteConnection, post_id: &str) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT uid FROM post_likes WHERE post_id = ? ORDER BY create_time, uid")
        .bind(post_id)
        .fetch_all(conn)
        .await
        .context("查询点赞列表失败")?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>("uid")).collect())
}

impl PostDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn insert_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (post_id, owner_uid, title, content, photo_url, create_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.post_id)
        .bind(&post.owner_uid)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.photo_url)
        .bind(post.create_time)
        .execute(&self.db)
        .await
        .context("插入帖子失败")?;
        Ok(())
    }

    /// 查询帖子（不含点赞）
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT post_id, owner_uid, title, content, photo_url, create_time
            FROM posts WHERE post_id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.db)
        .await
        .context("查询帖子失败")?;
        Ok(row.as_ref().map(Self::row_to_post))
    }

    /// 用户的帖子，按创建时间倒序（不含点赞）
    pub async fn list_posts_by_owner(&self, owner_uid: &str) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT post_id, owner_uid, title, content, photo_url, create_time
            FROM posts
            WHERE owner_uid = ?
            ORDER BY create_time DESC, post_id DESC
            "#,
        )
        .bind(owner_uid)
        .fetch_all(&self.db)
        .await
        .context("查询用户帖子失败")?;
        let posts: Vec<Post> = rows.iter().map(Self::row_to_post).collect();
        debug!("[PostDAO] 用户 {} 共 {} 条帖子", owner_uid, posts.len());
        Ok(posts)
    }

    pub async fn count_posts(&self, owner_uid: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM posts WHERE owner_uid = ?")
            .bind(owner_uid)
            .fetch_one(&self.db)
            .await
            .context("统计帖子数量失败")?;
        Ok(row.get("n"))
    }

    pub async fn update_post_text(&self, post_id: &str, title: &str, content: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET title = ?, content = ? WHERE post_id = ?")
            .bind(title)
            .bind(content)
            .bind(post_id)
            .execute(&self.db)
            .await
            .context("更新帖子失败")?;
        Ok(())
    }

    pub async fn list_likes(&self, post_id: &str) -> Result<Vec<String>> {
        let mut conn = self.db.acquire().await.context("获取数据库连接失败")?;
        likes_in(&mut conn, post_id).await
    }

    /// 切换 uid 在点赞集合中的成员关系，返回切换后的集合
    ///
    /// 单行插入/删除，不会覆盖其他人的点赞。
    pub async fn toggle_like(&self, post_id: &str, uid: &str, now: i64) -> Result<Vec<String>> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND uid = ?")
            .bind(post_id)
            .bind(uid)
            .execute(&mut *tx)
            .await
            .context("取消点赞失败")?
            .rows_affected();

        if removed == 0 {
            sqlx::query("INSERT INTO post_likes (post_id, uid, create_time) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(uid)
                .bind(now)
                .execute(&mut *tx)
                .await
                .context("点赞失败")?;
        }

        let likes = likes_in(&mut tx, post_id).await?;
        tx.commit().await.context("提交事务失败")?;
        Ok(likes)
    }

    /// 删除帖子及其全部评论和点赞；任一步失败整体回滚
    pub async fn delete_post_cascade(&self, post_id: &str) -> Result<CascadeDeleted> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;

        let comments = sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("删除帖子评论失败")?
            .rows_affected();
        let likes = sqlx::query("DELETE FROM post_likes WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("删除帖子点赞失败")?
            .rows_affected();
        let posts = sqlx::query("DELETE FROM posts WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("删除帖子失败")?
            .rows_affected();

        tx.commit().await.context("提交事务失败")?;
        info!(
            "[PostDAO] 帖子 {} 已删除，评论: {}, 点赞: {}",
            post_id, comments, likes
        );
        Ok(CascadeDeleted {
            comments,
            likes,
            posts,
        })
    }

    pub async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (comment_id, post_id, author_uid, author_name, text, create_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.comment_id)
        .bind(&comment.post_id)
        .bind(&comment.author_uid)
        .bind(&comment.author_name)
        .bind(&comment.text)
        .bind(comment.create_time)
        .execute(&self.db)
        .await
        .context("插入评论失败")?;
        Ok(())
    }

    pub async fn get_comment(&self, comment_id: &str) -> Result<Option<Comment>> {
        let row = sqlx::query(
            r#"
            SELECT comment_id, post_id, author_uid, author_name, text, create_time
            FROM comments WHERE comment_id = ?
            "#,
        )
        .bind(comment_id)
        .fetch_optional(&self.db)
        .await
        .context("查询评论失败")?;
        Ok(row.as_ref().map(row_to_comment))
    }

    /// 帖子的评论，按时间正序
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT comment_id, post_id, author_uid, author_name, text, create_time
            FROM comments
            WHERE post_id = ?
            ORDER BY create_time, comment_id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await
        .context("查询评论列表失败")?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE comment_id = ?")
            .bind(comment_id)
            .execute(&self.db)
            .await
            .context("删除评论失败")?;
        Ok(result.rows_affected() == 1)
    }

    fn row_to_post(row: &SqliteRow) -> Post {
        Post {
            post_id: row.get("post_id"),
            owner_uid: row.get("owner_uid"),
            title: row.get("title"),
            content: row.get("content"),
            photo_url: row.get("photo_url"),
            likes: Vec::new(),
            create_time: row.get("create_time"),
        }
    }
}
