//! 用户资料数据访问层（DAO）
//!
//! socials / stats / skills 以 JSON 文本存储在 users 表中。

use crate::sphere::user::models::{ProfileStats, UserProfile};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 用户 DAO（基于 sqlx）
#[derive(Clone)]
pub struct UserDao {
    db: Pool<Sqlite>,
}

const USER_COLUMNS: &str = r#"
    uid, name, email, title, bio, location, avatar, cover_image,
    socials, stats, skills, create_time
"#;

fn row_to_user(row: &SqliteRow) -> Result<UserProfile> {
    let socials: String = row.get("socials");
    let stats: String = row.get("stats");
    let skills: String = row.get("skills");
    Ok(UserProfile {
        uid: row.get("uid"),
        name: row.get("name"),
        email: row.get("email"),
        title: row.get("title"),
        bio: row.get("bio"),
        location: row.get("location"),
        avatar: row.get("avatar"),
        cover_image: row.get("cover_image"),
        socials: serde_json::from_str(&socials).context("解析 socials 字段失败")?,
        stats: serde_json::from_str(&stats).context("解析 stats 字段失败")?,
        skills: serde_json::from_str(&skills).context("解析 skills 字段失败")?,
        create_time: row.get("create_time"),
    })
}

impl UserDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 按 uid 查询用户资料
    pub async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>> {
        let sql = format!("SELECT {} FROM users WHERE uid = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(uid)
            .fetch_optional(&self.db)
            .await
            .context("查询用户资料失败")?;
        row.as_ref().map(row_to_user).transpose()
    }

    /// 不存在时插入，返回是否真正插入
    pub async fn insert_if_absent(&self, user: &UserProfile) -> Result<bool> {
        let sql = r#"
            INSERT OR IGNORE INTO users (
                uid, name, email, title, bio, location, avatar, cover_image,
                socials, stats, skills, create_time
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)
        "#;
        let result = Self::bind_user(sqlx::query(sql), user)?
            .execute(&self.db)
            .await
            .context("插入用户资料失败")?;
        Ok(result.rows_affected() == 1)
    }

    /// 插入或整体覆盖用户资料
    pub async fn save_user(&self, user: &UserProfile) -> Result<()> {
        let sql = r#"
            INSERT INTO users (
                uid, name, email, title, bio, location, avatar, cover_image,
                socials, stats, skills, create_time
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(uid) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                title = excluded.title,
                bio = excluded.bio,
                location = excluded.location,
                avatar = excluded.avatar,
                cover_image = excluded.cover_image,
                socials = excluded.socials,
                stats = excluded.stats,
                skills = excluded.skills
        "#;
        Self::bind_user(sqlx::query(sql), user)?
            .execute(&self.db)
            .await
            .context("保存用户资料失败")?;
        Ok(())
    }

    /// 列出除指定用户外的所有用户（好友推荐）
    pub async fn list_users_except(&self, uid: &str) -> Result<Vec<UserProfile>> {
        let sql = format!(
            "SELECT {} FROM users WHERE uid <> ? ORDER BY create_time, uid",
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(uid)
            .fetch_all(&self.db)
            .await
            .context("查询用户列表失败")?;
        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
        debug!("[UserDAO] 查询到 {} 个其他用户", users.len());
        Ok(users)
    }

    /// 覆盖统计计数
    pub async fn set_stats(&self, uid: &str, stats: &ProfileStats) -> Result<()> {
        sqlx::query("UPDATE users SET stats = ? WHERE uid = ?")
            .bind(serde_json::to_string(stats)?)
            .bind(uid)
            .execute(&self.db)
            .await
            .context("更新用户统计失败")?;
        Ok(())
    }

    fn bind_user<'q>(
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        user: &'q UserProfile,
    ) -> Result<sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>> {
        Ok(query
            .bind(&user.uid)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.title)
            .bind(&user.bio)
            .bind(&user.location)
            .bind(&user.avatar)
            .bind(&user.cover_image)
            .bind(serde_json::to_string(&user.socials)?)
            .bind(serde_json::to_string(&user.stats)?)
            .bind(serde_json::to_string(&user.skills)?)
            .bind(user.create_time))
    }
}
