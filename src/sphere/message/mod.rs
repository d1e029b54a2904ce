//! 聊天模块
//!
//! 一对一会话和群聊：消息追加、历史读取、实时快照订阅

pub mod dao;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use dao::MessageDao;
pub use models::{conversation_id, ChannelKind, ChatMessage, Conversation, Group};
pub use service::MessagingService;
