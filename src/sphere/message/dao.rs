//! 聊天数据访问层（DAO）
//!
//! 所有频道的消息存放在同一张 messages 表，按 (channel_kind, channel_id) 区分；
//! seq 为自增主键，用于同一时间戳内的稳定排序。

use crate::sphere::message::models::{ChannelKind, ChatMessage, Conversation, Group};
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 聊天 DAO（基于 sqlx）
#[derive(Clone)]
pub struct MessageDao {
    db: Pool<Sqlite>,
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage> {
    let kind: String = row.get("channel_kind");
    Ok(ChatMessage {
        message_id: row.get("message_id"),
        channel_kind: kind.parse::<ChannelKind>().map_err(|e| anyhow!(e))?,
        channel_id: row.get("channel_id"),
        sender_uid: row.get("sender_uid"),
        sender_name: row.get("sender_name"),
        sender_avatar: row.get("sender_avatar"),
        recipient_uid: row.get("recipient_uid"),
        text: row.get("text"),
        send_time: row.get("send_time"),
        seq: row.get("seq"),
    })
}

fn row_to_group(row: &SqliteRow) -> Group {
    Group {
        group_id: row.get("group_id"),
        name: row.get("name"),
        create_time: row.get("create_time"),
    }
}

impl MessageDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 会话不存在时创建，返回是否新建
    pub async fn ensure_conversation(&self, conv: &Conversation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO conversations (chat_id, participant_a, participant_b, create_time)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&conv.chat_id)
        .bind(&conv.participants[0])
        .bind(&conv.participants[1])
        .bind(conv.create_time)
        .execute(&self.db)
        .await
        .context("创建会话失败")?;
        Ok(result.rows_affected() == 1)
    }

    /// 用户参与的所有会话
    pub async fn list_conversations(&self, uid: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT chat_id, participant_a, participant_b, create_time
            FROM conversations
            WHERE participant_a = ? OR participant_b = ?
            ORDER BY create_time DESC, chat_id
            "#,
        )
        .bind(uid)
        .bind(uid)
        .fetch_all(&self.db)
        .await
        .context("查询会话列表失败")?;

        Ok(rows
            .iter()
            .map(|row| Conversation {
                chat_id: row.get("chat_id"),
                participants: [row.get("participant_a"), row.get("participant_b")],
                create_time: row.get("create_time"),
            })
            .collect())
    }

    /// 追加消息，返回分配的 seq
    pub async fn insert_message(&self, msg: &ChatMessage) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (
                message_id, channel_kind, channel_id, sender_uid, sender_name,
                sender_avatar, recipient_uid, text, send_time
            ) VALUES (?,?,?,?,?,?,?,?,?)
            "#,
        )
        .bind(&msg.message_id)
        .bind(msg.channel_kind.as_str())
        .bind(&msg.channel_id)
        .bind(&msg.sender_uid)
        .bind(&msg.sender_name)
        .bind(&msg.sender_avatar)
        .bind(&msg.recipient_uid)
        .bind(&msg.text)
        .bind(msg.send_time)
        .execute(&self.db)
        .await
        .context("写入消息失败")?;
        Ok(result.last_insert_rowid())
    }

    /// 频道内全部消息，按时间戳、seq 升序
    pub async fn list_messages(&self, kind: ChannelKind, channel_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, message_id, channel_kind, channel_id, sender_uid, sender_name,
                   sender_avatar, recipient_uid, text, send_time
            FROM messages
            WHERE channel_kind = ? AND channel_id = ?
            ORDER BY send_time ASC, seq ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(channel_id)
        .fetch_all(&self.db)
        .await
        .context("查询消息历史失败")?;

        let messages = rows.iter().map(row_to_message).collect::<Result<Vec<_>>>()?;
        debug!(
            "[MessageDAO] {} 频道 {} 共 {} 条消息",
            kind,
            channel_id,
            messages.len()
        );
        Ok(messages)
    }

    pub async fn insert_group(&self, group: &Group) -> Result<()> {
        sqlx::query("INSERT INTO chat_groups (group_id, name, create_time) VALUES (?, ?, ?)")
            .bind(&group.group_id)
            .bind(&group.name)
            .bind(group.create_time)
            .execute(&self.db)
            .await
            .context("创建群聊失败")?;
        Ok(())
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT group_id, name, create_time FROM chat_groups WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&self.db)
            .await
            .context("查询群聊失败")?;
        Ok(row.as_ref().map(row_to_group))
    }

    /// 全部群聊，按创建时间升序
    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT group_id, name, create_time FROM chat_groups ORDER BY create_time, group_id",
        )
        .fetch_all(&self.db)
        .await
        .context("查询群聊列表失败")?;
        Ok(rows.iter().map(row_to_group).collect())
    }
}
