//! 领域错误定义
//!
//! 服务层统一返回 `anyhow::Result`，需要区分错误类别时使用
//! `err.downcast_ref::<SphereError>()` 取回具体类型。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SphereError {
    /// 当前没有登录会话
    #[error("未登录")]
    NotAuthenticated,

    /// 身份提供方拒绝（密码错误、弹窗取消等）
    #[error("认证失败: {0}")]
    Auth(String),

    #[error("{kind} 不存在: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("无权操作: {0}")]
    Forbidden(String),

    /// 好友关系状态机中不允许的迁移
    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("文件存储失败: {0}")]
    Blob(String),
}

impl SphereError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        SphereError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        SphereError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// 从 anyhow 错误链中取出领域错误（如果有）
pub fn sphere_error(err: &anyhow::Error) -> Option<&SphereError> {
    err.downcast_ref::<SphereError>()
}
