//! 聊天数据模型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 消息所在的频道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Direct,
    Group,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Direct => "direct",
            ChannelKind::Group => "group",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ChannelKind::Direct),
            "group" => Ok(ChannelKind::Group),
            other => Err(format!("未知的频道类型: {}", other)),
        }
    }
}

/// 聊天消息
///
/// 群聊消息的 recipient_uid 为空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: String,
    pub channel_kind: ChannelKind,
    pub channel_id: String,
    #[serde(rename = "senderId")]
    pub sender_uid: String,
    pub sender_name: String,
    pub sender_avatar: String,
    #[serde(rename = "recipientId")]
    pub recipient_uid: String,
    pub text: String,
    /// 服务端写入时间（毫秒）
    #[serde(rename = "timestamp")]
    pub send_time: i64,
    /// 同一毫秒内的追加顺序
    pub seq: i64,
}

/// 一对一会话容器（chats/{chatId}）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub chat_id: String,
    pub participants: [String; 2],
    pub create_time: i64,
}

impl Conversation {
    /// 会话中除 uid 以外的另一方
    pub fn peer_of(&self, uid: &str) -> &str {
        if self.participants[0] == uid {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }
}

/// 群聊（groups/{groupId}）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: String,
    pub name: String,
    pub create_time: i64,
}

/// 两个用户的会话 id：按字典序排序后用 `_` 连接
///
/// uid 中的 `%` 和 `_` 先转义为 `%25`、`%5F`，连接符在结果中唯一，
/// 不同的用户对不会得到同一个 id。
pub fn conversation_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}_{}", escape_uid(first), escape_uid(second))
}

fn escape_uid(uid: &str) -> String {
    uid.replace('%', "%25").replace('_', "%5F")
}
