//! 好友关系模型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 好友申请状态；accepted / declined 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "declined" => Ok(RequestStatus::Declined),
            other => Err(format!("未知的申请状态: {}", other)),
        }
    }
}

/// 好友申请（friend_requests/{id}）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub request_id: String,
    #[serde(rename = "from")]
    pub from_uid: String,
    #[serde(rename = "to")]
    pub to_uid: String,
    pub from_name: String,
    pub to_name: String,
    pub status: RequestStatus,
    pub create_time: i64,
    pub update_time: i64,
}

/// 单侧好友边（users/{owner}/friends/{friend}），两侧都存在才算好友
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendEdge {
    pub owner_uid: String,
    #[serde(rename = "friendId")]
    pub friend_uid: String,
    pub name: String,
    pub avatar: String,
    pub added_time: i64,
}

/// viewer 看 subject 时的关系状态（计算得出，不存储）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationState {
    OwnProfile,
    Friends,
    /// viewer → subject 有 pending 申请
    Sent,
    /// subject → viewer 有 pending 申请
    Received,
    None,
}

impl RelationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationState::OwnProfile => "ownProfile",
            RelationState::Friends => "friends",
            RelationState::Sent => "sent",
            RelationState::Received => "received",
            RelationState::None => "none",
        }
    }
}

impl fmt::Display for RelationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for s in [RequestStatus::Pending, RequestStatus::Accepted, RequestStatus::Declined] {
            assert_eq!(s.as_str().parse::<RequestStatus>().unwrap(), s);
        }
        assert!("cancelled".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn request_json_uses_document_field_names() {
        let req = FriendRequest {
            request_id: "r1".into(),
            from_uid: "a".into(),
            to_uid: "b".into(),
            from_name: "A".into(),
            to_name: "B".into(),
            status: RequestStatus::Pending,
            create_time: 1,
            update_time: 1,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["from"], "a");
        assert_eq!(json["to"], "b");
        assert_eq!(json["status"], "pending");
    }
}
