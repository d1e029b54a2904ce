//! 用户资料模块

pub mod dao;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use dao::UserDao;
pub use models::{parse_skills, ProfileStats, ProfileUpdate, Socials, UserProfile};
pub use service::UserService;
