//! 好友数据访问层（DAO）
//!
//! 负责好友边和好友申请的数据库操作。涉及多条记录的迁移（接受申请、删除好友）
//! 在同一个事务中完成。

use crate::sphere::friend::models::{FriendEdge, FriendRequest, RequestStatus};
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// 好友 DAO（基于 sqlx）
#[derive(Clone)]
pub struct FriendDao {
    db: Pool<Sqlite>,
}

fn row_to_edge(row: &SqliteRow) -> FriendEdge {
    FriendEdge {
        owner_uid: row.get("owner_uid"),
        friend_uid: row.get("friend_uid"),
        name: row.get("name"),
        avatar: row.get("avatar"),
        added_time: row.get("added_time"),
    }
}

fn row_to_request(row: &SqliteRow) -> Result<FriendRequest> {
    let status: String = row.get("status");
    Ok(FriendRequest {
        request_id: row.get("request_id"),
        from_uid: row.get("from_uid"),
        to_uid: row.get("to_uid"),
        from_name: row.get("from_name"),
        to_name: row.get("to_name"),
        status: status.parse::<RequestStatus>().map_err(|e| anyhow!(e))?,
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    })
}

const REQUEST_COLUMNS: &str = r#"
    request_id, from_uid, to_uid, from_name, to_name, status, create_time, update_time
"#;

const UPSERT_EDGE_SQL: &str = r#"
    INSERT INTO friends (owner_uid, friend_uid, name, avatar, added_time)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT(owner_uid, friend_uid) DO NOTHING
"#;

impl FriendDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 查询 owner 一侧的好友边
    pub async fn get_friend(&self, owner_uid: &str, friend_uid: &str) -> Result<Option<FriendEdge>> {
        let row = sqlx::query(
            r#"
            SELECT owner_uid, friend_uid, name, avatar, added_time
            FROM friends
            WHERE owner_uid = ? AND friend_uid = ?
            "#,
        )
        .bind(owner_uid)
        .bind(friend_uid)
        .fetch_optional(&self.db)
        .await
        .context("查询好友关系失败")?;
        Ok(row.as_ref().map(row_to_edge))
    }

    /// 获取用户的所有好友
    pub async fn list_friends(&self, owner_uid: &str) -> Result<Vec<FriendEdge>> {
        let rows = sqlx::query(
            r#"
            SELECT owner_uid, friend_uid, name, avatar, added_time
            FROM friends
            WHERE owner_uid = ?
            ORDER BY added_time, friend_uid
            "#,
        )
        .bind(owner_uid)
        .fetch_all(&self.db)
        .await
        .context("查询好友列表失败")?;

        let friends: Vec<FriendEdge> = rows.iter().map(row_to_edge).collect();
        debug!("[FriendDAO] 用户 {} 共 {} 个好友", owner_uid, friends.len());
        Ok(friends)
    }

    /// 双向好友边都存在的好友 uid 列表
    pub async fn list_mutual_friend_ids(&self, owner_uid: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT f.friend_uid
            FROM friends f
            JOIN friends r ON r.owner_uid = f.friend_uid AND r.friend_uid = f.owner_uid
            WHERE f.owner_uid = ?
            "#,
        )
        .bind(owner_uid)
        .fetch_all(&self.db)
        .await
        .context("查询双向好友列表失败")?;
        Ok(rows
            .into_iter()
            .map(|m| m.get::<String, _>("friend_uid"))
            .collect())
    }

    /// 按 id 查询好友申请
    pub async fn get_request(&self, request_id: &str) -> Result<Option<FriendRequest>> {
        let sql = format!(
            "SELECT {} FROM friend_requests WHERE request_id = ?",
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request_id)
            .fetch_optional(&self.db)
            .await
            .context("查询好友申请失败")?;
        row.as_ref().map(row_to_request).transpose()
    }

    /// 查询 from → to 的 pending 申请
    pub async fn find_pending(&self, from_uid: &str, to_uid: &str) -> Result<Option<FriendRequest>> {
        let sql = format!(
            "SELECT {} FROM friend_requests WHERE from_uid = ? AND to_uid = ? AND status = 'pending'",
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(from_uid)
            .bind(to_uid)
            .fetch_optional(&self.db)
            .await
            .context("查询待处理好友申请失败")?;
        row.as_ref().map(row_to_request).transpose()
    }

    /// 收件人的所有 pending 申请
    pub async fn list_incoming_pending(&self, to_uid: &str) -> Result<Vec<FriendRequest>> {
        let sql = format!(
            "SELECT {} FROM friend_requests WHERE to_uid = ? AND status = 'pending' ORDER BY create_time, request_id",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_uid)
            .fetch_all(&self.db)
            .await
            .context("查询收到的好友申请失败")?;
        rows.iter().map(row_to_request).collect()
    }

    /// 插入申请；同一 (from, to) 已有 pending 时被唯一索引拦下，返回 false
    pub async fn insert_request(&self, req: &FriendRequest) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO friend_requests (
                request_id, from_uid, to_uid, from_name, to_name, status, create_time, update_time
            ) VALUES (?,?,?,?,?,?,?,?)
            "#,
        )
        .bind(&req.request_id)
        .bind(&req.from_uid)
        .bind(&req.to_uid)
        .bind(&req.from_name)
        .bind(&req.to_name)
        .bind(req.status.as_str())
        .bind(req.create_time)
        .bind(req.update_time)
        .execute(&self.db)
        .await
        .context("插入好友申请失败")?;
        Ok(result.rows_affected() == 1)
    }

    /// 删除仍处于 pending 的申请（撤回），返回是否删除
    pub async fn delete_pending_request(&self, request_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM friend_requests WHERE request_id = ? AND status = 'pending'",
        )
        .bind(request_id)
        .execute(&self.db)
        .await
        .context("删除好友申请失败")?;
        Ok(result.rows_affected() == 1)
    }

    /// 拒绝 pending 申请，返回是否迁移成功
    pub async fn decline_request(&self, request_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE friend_requests SET status = 'declined', update_time = ?
            WHERE request_id = ? AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(request_id)
        .execute(&self.db)
        .await
        .context("拒绝好友申请失败")?;
        Ok(result.rows_affected() == 1)
    }

    /// 接受申请：更新状态并写入两侧好友边，全部在一个事务里完成
    ///
    /// 申请已不是 pending 时回滚并返回 false。好友边已存在时保持不变。
    pub async fn accept_request(
        &self,
        request_id: &str,
        edges: [&FriendEdge; 2],
        now: i64,
    ) -> Result<bool> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;

        let updated = sqlx::query(
            r#"
            UPDATE friend_requests SET status = 'accepted', update_time = ?
            WHERE request_id = ? AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(request_id)
        .execute(&mut *tx)
        .await
        .context("更新好友申请状态失败")?;

        if updated.rows_affected() != 1 {
            tx.rollback().await.context("回滚事务失败")?;
            return Ok(false);
        }

        for edge in edges {
            sqlx::query(UPSERT_EDGE_SQL)
                .bind(&edge.owner_uid)
                .bind(&edge.friend_uid)
                .bind(&edge.name)
                .bind(&edge.avatar)
                .bind(edge.added_time)
                .execute(&mut *tx)
                .await
                .context("写入好友关系失败")?;
        }

        tx.commit().await.context("提交事务失败")?;
        info!("[FriendDAO] 申请 {} 已接受，双向好友关系已写入", request_id);
        Ok(true)
    }

    /// 删除双向好友边，返回删除的行数
    pub async fn remove_friend(&self, a: &str, b: &str) -> Result<u64> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;
        let mut removed = 0;
        for (owner, friend) in [(a, b), (b, a)] {
            removed += sqlx::query("DELETE FROM friends WHERE owner_uid = ? AND friend_uid = ?")
                .bind(owner)
                .bind(friend)
                .execute(&mut *tx)
                .await
                .context("删除好友失败")?
                .rows_affected();
        }
        tx.commit().await.context("提交事务失败")?;
        Ok(removed)
    }
}
