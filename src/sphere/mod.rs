pub mod auth;
pub mod client;
pub mod db;
pub mod error;
pub mod feed;
pub mod friend;
pub mod hub;
pub mod message;
pub mod post;
pub mod types;
pub mod user;

// 重新导出客户端入口
pub use client::{ClientConfig, SphereClient};
pub use error::SphereError;
