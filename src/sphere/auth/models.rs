//! 认证相关模型

use serde::{Deserialize, Serialize};

/// 已认证的用户主体
///
/// 所有服务接口显式接收 `&Principal`，不依赖全局会话。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    #[serde(skip)]
    pub id_token: String,
    #[serde(skip)]
    pub refresh_token: String,
}

impl Principal {
    /// 构造不带令牌的主体（本地恢复会话、测试）
    pub fn new(uid: impl Into<String>, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: display_name.into(),
            photo_url: String::new(),
            id_token: String::new(),
            refresh_token: String::new(),
        }
    }

    /// 展示名：昵称 > 邮箱 > "Anonymous"
    pub fn author_name(&self) -> String {
        if !self.display_name.trim().is_empty() {
            self.display_name.clone()
        } else if !self.email.trim().is_empty() {
            self.email.clone()
        } else {
            "Anonymous".to_string()
        }
    }
}

/// 第三方登录提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdpProvider {
    Google,
    GitHub,
}

impl IdpProvider {
    pub fn provider_id(&self) -> &'static str {
        match self {
            IdpProvider::Google => "google.com",
            IdpProvider::GitHub => "github.com",
        }
    }

    /// 第三方凭证在 signInWithIdp 请求体中的参数名
    ///
    /// Google 签发 OIDC id token，GitHub 只有 OAuth access token。
    pub fn credential_param(&self) -> &'static str {
        match self {
            IdpProvider::Google => "id_token",
            IdpProvider::GitHub => "access_token",
        }
    }
}

impl std::str::FromStr for IdpProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" | "google.com" => Ok(IdpProvider::Google),
            "github" | "github.com" => Ok(IdpProvider::GitHub),
            other => Err(format!("未知的登录提供方: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_name_falls_back_to_email_then_anonymous() {
        let mut p = Principal::new("u1", "a@x.io", "Alice");
        assert_eq!(p.author_name(), "Alice");
        p.display_name = " ".into();
        assert_eq!(p.author_name(), "a@x.io");
        p.email.clear();
        assert_eq!(p.author_name(), "Anonymous");
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("GitHub".parse::<IdpProvider>().unwrap(), IdpProvider::GitHub);
        assert_eq!("google.com".parse::<IdpProvider>().unwrap().provider_id(), "google.com");
        assert!("facebook".parse::<IdpProvider>().is_err());
    }
}
