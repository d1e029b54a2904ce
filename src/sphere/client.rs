//! ConnectSphere 客户端入口
//!
//! 持有共享连接池和各个服务，负责登录后的资料初始化。

use crate::sphere::auth::{IdentityProvider, IdpProvider, Principal, RestIdentityProvider, SessionManager};
use crate::sphere::db::create_sqlite_pool_with_migration;
use crate::sphere::feed::FeedAggregator;
use crate::sphere::friend::{FriendListener, RelationshipService};
use crate::sphere::message::MessagingService;
use crate::sphere::post::{BlobStore, LocalBlobStore, PostService};
use crate::sphere::user::UserService;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::info;

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 本地文档库 SQLite URL
    ///
    /// 例如：`sqlite://sphere.db?mode=rwc`
    pub db_url: String,
    /// 身份服务 REST 基础地址
    pub identity_base_url: String,
    /// 身份服务 API key
    pub api_key: String,
    /// 帖子配图存放目录
    pub blob_root: String,
    /// 配图对外访问前缀，为空时返回 file:// URL
    pub blob_base_url: Option<String>,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            identity_base_url: "https://identitytoolkit.googleapis.com".to_string(),
            api_key: String::new(),
            blob_root: "sphere-blobs".to_string(),
            blob_base_url: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("sqlite://sphere.db?mode=rwc")
    }
}

/// ConnectSphere 客户端
#[derive(Clone)]
pub struct SphereClient {
    pub(crate) config: ClientConfig,
    db: Pool<Sqlite>,
    session: Arc<SessionManager>,
    users: Arc<UserService>,
    relationships: Arc<RelationshipService>,
    feed: Arc<FeedAggregator>,
    posts: Arc<PostService>,
    messaging: Arc<MessagingService>,
}

impl SphereClient {
    /// 按配置连接数据库、身份服务和本地文件存储
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let db = create_sqlite_pool_with_migration(&config.db_url).await?;
        let identity: Arc<dyn IdentityProvider> = Arc::new(RestIdentityProvider::new(
            config.identity_base_url.clone(),
            config.api_key.clone(),
        )?);
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(
            config.blob_root.clone(),
            config.blob_base_url.clone(),
        ));
        Ok(Self::with_parts(config, db, identity, blobs))
    }

    /// 用现成的组件组装客户端（测试或自定义后端使用）
    pub fn with_parts(
        config: ClientConfig,
        db: Pool<Sqlite>,
        identity: Arc<dyn IdentityProvider>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        info!("[Client] 初始化 ConnectSphere 客户端，数据库: {}", config.db_url);
        Self {
            session: Arc::new(SessionManager::new(identity)),
            users: Arc::new(UserService::new(db.clone())),
            relationships: Arc::new(RelationshipService::new(db.clone())),
            feed: Arc::new(FeedAggregator::new(db.clone())),
            posts: Arc::new(PostService::new(db.clone(), blobs)),
            messaging: Arc::new(MessagingService::new(db.clone())),
            db,
            config,
        }
    }

    /// 注册好友监听器
    ///
    /// 关系服务会用新的监听器重建，之前的收件箱订阅需要重新订阅。
    pub fn set_friend_listener(&mut self, listener: Arc<dyn FriendListener>) {
        self.relationships = Arc::new(RelationshipService::with_listener(self.db.clone(), listener));
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Principal> {
        let principal = self.session.sign_in_with_password(email, password).await?;
        self.users.ensure_profile(&principal).await?;
        Ok(principal)
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Principal> {
        let principal = self.session.sign_up(email, password, display_name).await?;
        self.users.ensure_profile(&principal).await?;
        Ok(principal)
    }

    pub async fn sign_in_with_idp(&self, provider: IdpProvider, token: &str) -> Result<Principal> {
        let principal = self.session.sign_in_with_idp(provider, token).await?;
        self.users.ensure_profile(&principal).await?;
        Ok(principal)
    }

    /// 以本地已有用户的身份恢复会话（不经过身份服务）
    pub async fn restore_session(&self, uid: &str) -> Result<Principal> {
        let profile = self.users.get_profile(uid).await?;
        let mut principal = Principal::new(profile.uid, profile.email, profile.name);
        principal.photo_url = profile.avatar;
        self.session.restore(principal.clone());
        Ok(principal)
    }

    pub fn sign_out(&self) {
        self.session.sign_out();
    }

    /// 当前登录主体，未登录返回 `NotAuthenticated`
    pub fn current_principal(&self) -> Result<Principal> {
        self.session.require()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn db(&self) -> &Pool<Sqlite> {
        &self.db
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn relationships(&self) -> &RelationshipService {
        &self.relationships
    }

    pub fn feed(&self) -> &FeedAggregator {
        &self.feed
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn messaging(&self) -> &MessagingService {
        &self.messaging
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::auth::session::tests::FakeIdentityProvider;
    use crate::sphere::db::create_memory_pool;
    use crate::sphere::error::{sphere_error, SphereError};

    async fn client() -> (SphereClient, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = create_memory_pool().await.unwrap();
        let client = SphereClient::with_parts(
            ClientConfig::new("sqlite::memory:"),
            db,
            Arc::new(FakeIdentityProvider),
            Arc::new(LocalBlobStore::new(dir.path(), None)),
        );
        (client, dir)
    }

    #[tokio::test]
    async fn sign_in_creates_profile() {
        let (client, _dir) = client().await;
        let err = client.current_principal().unwrap_err();
        assert!(matches!(sphere_error(&err), Some(SphereError::NotAuthenticated)));

        let p = client.sign_in_with_password("alice@x.io", "secret").await.unwrap();
        assert_eq!(client.current_principal().unwrap().uid, p.uid);
        assert_eq!(client.users().get_profile(&p.uid).await.unwrap().email, "alice@x.io");

        client.sign_out();
        assert!(client.current_principal().is_err());
    }

    #[tokio::test]
    async fn restore_session_uses_stored_profile() {
        let (client, _dir) = client().await;
        let p = client.sign_up("bob@x.io", "pw", "Bob").await.unwrap();
        client.sign_out();

        let restored = client.restore_session(&p.uid).await.unwrap();
        assert_eq!(restored.display_name, "Bob");
        assert_eq!(client.current_principal().unwrap().uid, p.uid);

        let err = client.restore_session("ghost").await.unwrap_err();
        assert!(matches!(sphere_error(&err), Some(SphereError::NotFound { .. })));
    }
}
