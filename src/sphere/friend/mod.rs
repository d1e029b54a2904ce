//! 好友关系模块
//!
//! 好友边、好友申请记录，以及 (viewer, subject) 关系状态机

pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use dao::FriendDao;
pub use listener::{EmptyFriendListener, FriendListener};
pub use models::{FriendEdge, FriendRequest, RelationState, RequestStatus};
pub use service::RelationshipService;
