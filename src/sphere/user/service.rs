//! 用户资料服务层

use crate::sphere::auth::Principal;
use crate::sphere::error::SphereError;
use crate::sphere::types::now_millis;
use crate::sphere::user::dao::UserDao;
use crate::sphere::user::models::{ProfileUpdate, UserProfile};
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use tracing::info;

pub struct UserService {
    user_dao: UserDao,
}

impl UserService {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            user_dao: UserDao::new(db),
        }
    }

    /// 首次登录时创建默认资料，已存在则原样返回
    pub async fn ensure_profile(&self, principal: &Principal) -> Result<UserProfile> {
        if let Some(existing) = self.user_dao.get_user(&principal.uid).await? {
            return Ok(existing);
        }

        let mut profile = UserProfile::new_default(
            &principal.uid,
            &principal.email,
            &principal.display_name,
            now_millis(),
        );
        profile.avatar = principal.photo_url.clone();
        if self.user_dao.insert_if_absent(&profile).await? {
            info!("[UserService] 🆕 为用户 {} 创建默认资料", principal.uid);
            return Ok(profile);
        }
        // 并发登录时别的调用先插入了
        self.get_profile(&principal.uid).await
    }

    pub async fn get_profile(&self, uid: &str) -> Result<UserProfile> {
        self.user_dao
            .get_user(uid)
            .await?
            .ok_or_else(|| SphereError::not_found("user", uid).into())
    }

    pub async fn find_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.user_dao.get_user(uid).await
    }

    /// 合并更新当前用户资料
    pub async fn update_profile(
        &self,
        principal: &Principal,
        update: ProfileUpdate,
    ) -> Result<UserProfile> {
        let mut profile = self.get_profile(&principal.uid).await?;
        profile.apply(update);
        self.user_dao.save_user(&profile).await?;
        info!("[UserService] ✅ 用户 {} 资料已更新", principal.uid);
        Ok(profile)
    }

    /// 好友推荐：除自己之外的所有用户
    pub async fn suggestions(&self, principal: &Principal) -> Result<Vec<UserProfile>> {
        self.user_dao.list_users_except(&principal.uid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::db::create_memory_pool;
    use crate::sphere::error::sphere_error;
    use crate::sphere::user::models::Socials;

    #[tokio::test]
    async fn ensure_profile_creates_once() {
        let svc = UserService::new(create_memory_pool().await.unwrap());
        let alice = Principal::new("alice", "alice@x.io", "Alice");

        let first = svc.ensure_profile(&alice).await.unwrap();
        assert_eq!(first.name, "Alice");

        svc.update_profile(
            &alice,
            ProfileUpdate {
                bio: Some("hello".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // 第二次登录不会覆盖已编辑的资料
        let again = svc.ensure_profile(&alice).await.unwrap();
        assert_eq!(again.bio, "hello");
        assert_eq!(again.create_time, first.create_time);
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let svc = UserService::new(create_memory_pool().await.unwrap());
        let err = svc.get_profile("ghost").await.unwrap_err();
        assert!(matches!(
            sphere_error(&err),
            Some(SphereError::NotFound { kind: "user", .. })
        ));
    }

    #[tokio::test]
    async fn update_round_trips_json_columns() {
        let svc = UserService::new(create_memory_pool().await.unwrap());
        let bob = Principal::new("bob", "bob@x.io", "Bob");
        svc.ensure_profile(&bob).await.unwrap();

        let updated = svc
            .update_profile(
                &bob,
                ProfileUpdate {
                    skills: Some(vec!["rust".into(), "sql".into()]),
                    socials: Some(Socials {
                        github: "https://github.com/bob".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = svc.get_profile("bob").await.unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.skills, vec!["rust", "sql"]);
        assert_eq!(stored.socials.github, "https://github.com/bob");
    }

    #[tokio::test]
    async fn suggestions_exclude_self() {
        let svc = UserService::new(create_memory_pool().await.unwrap());
        let alice = Principal::new("alice", "alice@x.io", "Alice");
        svc.ensure_profile(&alice).await.unwrap();
        svc.ensure_profile(&Principal::new("bob", "bob@x.io", "Bob"))
            .await
            .unwrap();

        let list = svc.suggestions(&alice).await.unwrap();
        let ids: Vec<_> = list.iter().map(|u| u.uid.as_str()).collect();
        assert_eq!(ids, vec!["bob"]);
    }
}
