//! 好友动态流模块
//!
//! 汇总自己和所有好友的帖子，按时间倒序合并，并附带评论和点赞

pub mod models;
pub mod service;

pub use models::FeedPost;
pub use service::{sort_feed, FeedAggregator};
