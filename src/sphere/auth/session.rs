//! 登录会话管理
//!
//! 当前主体保存在 `watch` 通道里，订阅方通过 `subscribe` 获得会话变更通知
//! （登录、注册、登出）。

use crate::sphere::auth::api::IdentityProvider;
use crate::sphere::auth::models::{IdpProvider, Principal};
use crate::sphere::error::SphereError;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<Option<Principal>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(None);
        Self { provider, state }
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Principal> {
        let principal = self.provider.sign_in_with_password(email, password).await?;
        self.set(principal.clone());
        Ok(principal)
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Principal> {
        let principal = self.provider.sign_up(email, password, display_name).await?;
        self.set(principal.clone());
        Ok(principal)
    }

    pub async fn sign_in_with_idp(&self, provider: IdpProvider, token: &str) -> Result<Principal> {
        let principal = self.provider.sign_in_with_idp(provider, token).await?;
        self.set(principal.clone());
        Ok(principal)
    }

    /// 直接恢复一个已知主体（本地 CLI 以指定用户身份操作）
    pub fn restore(&self, principal: Principal) {
        self.set(principal);
    }

    pub fn sign_out(&self) {
        if let Some(p) = self.state.send_replace(None) {
            info!("[Session] 👋 用户登出: {}", p.uid);
        }
    }

    pub fn current(&self) -> Option<Principal> {
        self.state.borrow().clone()
    }

    /// 取当前主体，未登录时返回 `SphereError::NotAuthenticated`
    pub fn require(&self) -> Result<Principal> {
        self.current()
            .ok_or_else(|| SphereError::NotAuthenticated.into())
    }

    /// 订阅会话变更
    pub fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.state.subscribe()
    }

    fn set(&self, principal: Principal) {
        info!("[Session] 🔐 会话建立，用户ID: {}", principal.uid);
        self.state.send_replace(Some(principal));
    }
}
