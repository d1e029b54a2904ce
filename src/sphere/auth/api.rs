//! 身份提供方 HTTP 客户端
//!
//! 使用 Identity Toolkit 风格的 REST 接口完成邮箱密码登录、注册和第三方登录

use crate::sphere::auth::models::{IdpProvider, Principal};
use crate::sphere::error::SphereError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// 身份提供方接口
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 邮箱密码登录
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Principal>;

    /// 邮箱密码注册
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Principal>;

    /// 第三方登录（Google 传 id token，GitHub 传 access token）
    async fn sign_in_with_idp(&self, provider: IdpProvider, token: &str) -> Result<Principal>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordReq<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpReq {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResp {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    photo_url: String,
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: i32,
    message: String,
}

/// 解析认证接口响应：成功返回主体，失败映射为 `SphereError::Auth`
pub(crate) fn parse_auth_response(status: StatusCode, body: &[u8]) -> Result<Principal> {
    if !status.is_success() {
        let message = match serde_json::from_slice::<ApiErrorBody>(body) {
            Ok(err) => {
                debug!("[AuthAPI] 错误码: {}, 错误信息: {}", err.error.code, err.error.message);
                err.error.message
            }
            Err(_) => format!("HTTP 错误 {}: {}", status, String::from_utf8_lossy(body)),
        };
        return Err(SphereError::Auth(message).into());
    }

    let resp: AuthResp = serde_json::from_slice(body).context("解析认证响应失败")?;
    Ok(Principal {
        uid: resp.local_id,
        email: resp.email,
        display_name: resp.display_name,
        photo_url: resp.photo_url,
        id_token: resp.id_token,
        refresh_token: resp.refresh_token,
    })
}

/// 基于 reqwest 的身份提供方客户端
pub struct RestIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestIdentityProvider {
    /// 创建新的认证客户端
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/accounts:{}?key={}", self.base_url, method, self.api_key)
    }

    async fn call<B: Serialize + Sync>(&self, method: &str, body: &B) -> Result<Principal> {
        let url = self.endpoint(method);
        info!("[AuthAPI] 📡 请求 {}", method);
        debug!("[AuthAPI]   请求URL: {}/v1/accounts:{}", self.base_url, method);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("请求失败")?;

        let status = response.status();
        let body_bytes = response.bytes().await.context("读取响应 body 失败")?;

        match parse_auth_response(status, &body_bytes) {
            Ok(principal) => {
                info!("[AuthAPI] ✅ {} 成功，用户ID: {}", method, principal.uid);
                Ok(principal)
            }
            Err(e) => {
                error!("[AuthAPI] {} 失败: {}", method, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Principal> {
        let req = PasswordReq {
            email,
            password,
            display_name: None,
            return_secure_token: true,
        };
        self.call("signInWithPassword", &req).await
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Principal> {
        let req = PasswordReq {
            email,
            password,
            display_name: Some(display_name).filter(|n| !n.trim().is_empty()),
            return_secure_token: true,
        };
        let mut principal = self.call("signUp", &req).await?;
        // signUp 响应里不一定回带 displayName
        if principal.display_name.is_empty() {
            principal.display_name = display_name.trim().to_string();
        }
        Ok(principal)
    }

    async fn sign_in_with_idp(&self, provider: IdpProvider, token: &str) -> Result<Principal> {
        let req = IdpReq {
            post_body: idp_post_body(provider, token)?,
            request_uri: "http://localhost".to_string(),
            return_idp_credential: true,
            return_secure_token: true,
        };
        self.call("signInWithIdp", &req).await
    }
}

/// signInWithIdp 的 postBody：表单编码的凭证和提供方 id
fn idp_post_body(provider: IdpProvider, token: &str) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        "http://localhost",
        &[
            (provider.credential_param(), token),
            ("providerId", provider.provider_id()),
        ],
    )
    .context("构造第三方登录参数失败")?;
    Ok(url.query().unwrap_or_default().to_string())
}
