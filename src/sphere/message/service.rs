//! 聊天服务层
//!
//! 写入消息后重新读取频道全量快照推送给订阅者。

use crate::sphere::auth::Principal;
use crate::sphere::error::SphereError;
use crate::sphere::hub::SnapshotHub;
use crate::sphere::message::dao::MessageDao;
use crate::sphere::message::models::{conversation_id, ChannelKind, ChatMessage, Conversation, Group};
use crate::sphere::types::{generate_doc_id, now_millis, require_text};
use crate::sphere::user::UserDao;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use tokio::sync::watch;
use tracing::{debug, info};

/// 群聊列表通道只有一个
const ALL_GROUPS_KEY: &str = "*";

pub struct MessagingService {
    message_dao: MessageDao,
    user_dao: UserDao,
    direct_hub: SnapshotHub<Vec<ChatMessage>>,
    group_hub: SnapshotHub<Vec<ChatMessage>>,
    groups_hub: SnapshotHub<Vec<Group>>,
}

fn sender_name(principal: &Principal) -> String {
    if principal.display_name.trim().is_empty() {
        "Anonymous".to_string()
    } else {
        principal.display_name.clone()
    }
}

impl MessagingService {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            message_dao: MessageDao::new(db.clone()),
            user_dao: UserDao::new(db),
            direct_hub: SnapshotHub::new("direct"),
            group_hub: SnapshotHub::new("group"),
            groups_hub: SnapshotHub::new("groups"),
        }
    }

    /// 发送一对一消息，会话不存在时先创建
    pub async fn send_direct(&self, principal: &Principal, peer_uid: &str, text: &str) -> Result<ChatMessage> {
        let text = require_text("message", text)?;
        if self.user_dao.get_user(peer_uid).await?.is_none() {
            return Err(SphereError::not_found("user", peer_uid).into());
        }

        let now = now_millis();
        let chat_id = conversation_id(&principal.uid, peer_uid);
        let mut participants = [principal.uid.clone(), peer_uid.to_string()];
        participants.sort();
        let created = self
            .message_dao
            .ensure_conversation(&Conversation {
                chat_id: chat_id.clone(),
                participants,
                create_time: now,
            })
            .await?;
        if created {
            info!("[MessagingService] 🆕 创建会话 {}", chat_id);
        }

        let mut msg = ChatMessage {
            message_id: generate_doc_id(),
            channel_kind: ChannelKind::Direct,
            channel_id: chat_id.clone(),
            sender_uid: principal.uid.clone(),
            sender_name: sender_name(principal),
            sender_avatar: principal.photo_url.clone(),
            recipient_uid: peer_uid.to_string(),
            text,
            send_time: now,
            seq: 0,
        };
        msg.seq = self.message_dao.insert_message(&msg).await?;
        debug!("[MessagingService] 📨 {} -> {} seq={}", principal.uid, peer_uid, msg.seq);

        self.publish(ChannelKind::Direct, &chat_id).await?;
        Ok(msg)
    }

    /// 发送群消息；群必须存在，不校验成员
    pub async fn send_group(&self, principal: &Principal, group_id: &str, text: &str) -> Result<ChatMessage> {
        let text = require_text("message", text)?;
        self.get_group(group_id).await?;

        let mut msg = ChatMessage {
            message_id: generate_doc_id(),
            channel_kind: ChannelKind::Group,
            channel_id: group_id.to_string(),
            sender_uid: principal.uid.clone(),
            sender_name: sender_name(principal),
            sender_avatar: principal.photo_url.clone(),
            recipient_uid: String::new(),
            text,
            send_time: now_millis(),
            seq: 0,
        };
        msg.seq = self.message_dao.insert_message(&msg).await?;
        debug!("[MessagingService] 📨 {} -> 群 {} seq={}", principal.uid, group_id, msg.seq);

        self.publish(ChannelKind::Group, group_id).await?;
        Ok(msg)
    }

    pub async fn create_group(&self, principal: &Principal, name: &str) -> Result<Group> {
        let group = Group {
            group_id: generate_doc_id(),
            name: require_text("group name", name)?,
            create_time: now_millis(),
        };
        self.message_dao.insert_group(&group).await?;
        info!(
            "[MessagingService] 👥 用户 {} 创建群聊 {} ({})",
            principal.uid, group.name, group.group_id
        );

        self.groups_hub
            .refresh(ALL_GROUPS_KEY, || self.message_dao.list_groups())
            .await?;
        Ok(group)
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.message_dao.list_groups().await
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Group> {
        self.message_dao
            .get_group(group_id)
            .await?
            .ok_or_else(|| SphereError::not_found("group", group_id).into())
    }

    /// 与 peer 的会话历史，按时间升序
    pub async fn direct_history(&self, principal: &Principal, peer_uid: &str) -> Result<Vec<ChatMessage>> {
        let chat_id = conversation_id(&principal.uid, peer_uid);
        self.message_dao.list_messages(ChannelKind::Direct, &chat_id).await
    }

    pub async fn group_history(&self, group_id: &str) -> Result<Vec<ChatMessage>> {
        self.get_group(group_id).await?;
        self.message_dao.list_messages(ChannelKind::Group, group_id).await
    }

    pub async fn list_conversations(&self, uid: &str) -> Result<Vec<Conversation>> {
        self.message_dao.list_conversations(uid).await
    }

    /// 订阅与 peer 的会话，每条新消息后收到完整历史
    pub async fn subscribe_direct(
        &self,
        principal: &Principal,
        peer_uid: &str,
    ) -> Result<watch::Receiver<Vec<ChatMessage>>> {
        let chat_id = conversation_id(&principal.uid, peer_uid);
        self.direct_hub
            .subscribe_with(&chat_id, || {
                self.message_dao.list_messages(ChannelKind::Direct, &chat_id)
            })
            .await
    }

    pub async fn subscribe_group(&self, group_id: &str) -> Result<watch::Receiver<Vec<ChatMessage>>> {
        self.get_group(group_id).await?;
        self.group_hub
            .subscribe_with(group_id, || {
                self.message_dao.list_messages(ChannelKind::Group, group_id)
            })
            .await
    }

    /// 订阅群聊列表
    pub async fn subscribe_groups(&self) -> Result<watch::Receiver<Vec<Group>>> {
        self.groups_hub
            .subscribe_with(ALL_GROUPS_KEY, || self.message_dao.list_groups())
            .await
    }

    async fn publish(&self, kind: ChannelKind, channel_id: &str) -> Result<()> {
        let hub = match kind {
            ChannelKind::Direct => &self.direct_hub,
            ChannelKind::Group => &self.group_hub,
        };
        hub.refresh(channel_id, || self.message_dao.list_messages(kind, channel_id))
            .await
    }
}
