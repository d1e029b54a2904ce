//! 身份认证模块
//!
//! 对接外部身份提供方（邮箱密码、第三方登录），并维护当前登录会话

pub mod api;
pub mod models;
pub mod session;

// 重新导出主要类型
pub use api::{IdentityProvider, RestIdentityProvider};
pub use models::{IdpProvider, Principal};
pub use session::SessionManager;
