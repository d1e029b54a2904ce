//! 好友关系服务层
//!
//! 实现 (viewer, subject) 关系状态机：
//! none → sent（发送申请）、sent → none（撤回）、received → friends（接受）、
//! received → none（拒绝）。accepted / declined 为申请终态，再次申请会新建记录。

use crate::sphere::auth::Principal;
use crate::sphere::error::SphereError;
use crate::sphere::friend::dao::FriendDao;
use crate::sphere::friend::listener::{EmptyFriendListener, FriendListener};
use crate::sphere::friend::models::{FriendEdge, FriendRequest, RelationState, RequestStatus};
use crate::sphere::hub::SnapshotHub;
use crate::sphere::types::{generate_doc_id, now_millis};
use crate::sphere::user::UserDao;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct RelationshipService {
    friend_dao: FriendDao,
    user_dao: UserDao,
    listener: Arc<dyn FriendListener>,
    /// 收件箱实时订阅（key = 收件人 uid）
    incoming_hub: SnapshotHub<Vec<FriendRequest>>,
}

impl RelationshipService {
    /// 创建关系服务（使用默认空监听器）
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self::with_listener(db, Arc::new(EmptyFriendListener))
    }

    /// 创建关系服务（带自定义监听器）
    pub fn with_listener(db: Pool<Sqlite>, listener: Arc<dyn FriendListener>) -> Self {
        Self {
            friend_dao: FriendDao::new(db.clone()),
            user_dao: UserDao::new(db),
            listener,
            incoming_hub: SnapshotHub::new("incoming_requests"),
        }
    }

    /// 两侧好友边都存在才算好友
    pub async fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        let forward = self.friend_dao.get_friend(a, b).await?;
        if forward.is_none() {
            return Ok(false);
        }
        let backward = self.friend_dao.get_friend(b, a).await?;
        if backward.is_none() {
            warn!("[FriendService] 好友关系只有单侧记录: {} -> {}", a, b);
        }
        Ok(backward.is_some())
    }

    /// 计算 viewer 与 subject 的当前关系
    pub async fn relation_state(&self, viewer: &Principal, subject_uid: &str) -> Result<RelationState> {
        if viewer.uid == subject_uid {
            return Ok(RelationState::OwnProfile);
        }
        if self.are_friends(&viewer.uid, subject_uid).await? {
            return Ok(RelationState::Friends);
        }
        if self.friend_dao.find_pending(&viewer.uid, subject_uid).await?.is_some() {
            return Ok(RelationState::Sent);
        }
        if self.friend_dao.find_pending(subject_uid, &viewer.uid).await?.is_some() {
            return Ok(RelationState::Received);
        }
        Ok(RelationState::None)
    }

    /// none → sent：发送好友申请
    ///
    /// 已存在 viewer → subject 的 pending 申请时直接返回该申请，不会重复创建。
    pub async fn send_request(&self, viewer: &Principal, subject_uid: &str) -> Result<FriendRequest> {
        if viewer.uid == subject_uid {
            return Err(SphereError::Validation("不能向自己发送好友申请".into()).into());
        }
        let subject = self
            .user_dao
            .get_user(subject_uid)
            .await?
            .ok_or_else(|| SphereError::not_found("user", subject_uid))?;

        match self.relation_state(viewer, subject_uid).await? {
            RelationState::None => {}
            RelationState::Sent => {
                if let Some(existing) = self.friend_dao.find_pending(&viewer.uid, subject_uid).await? {
                    info!("[FriendService] 已向 {} 发送过申请，跳过", subject_uid);
                    return Ok(existing);
                }
            }
            other => return Err(SphereError::transition(other, RelationState::Sent).into()),
        }

        let now = now_millis();
        let from_name = if viewer.display_name.trim().is_empty() {
            "Anonymous User".to_string()
        } else {
            viewer.display_name.clone()
        };
        let req = FriendRequest {
            request_id: generate_doc_id(),
            from_uid: viewer.uid.clone(),
            to_uid: subject_uid.to_string(),
            from_name,
            to_name: subject.name.clone(),
            status: RequestStatus::Pending,
            create_time: now,
            update_time: now,
        };

        if !self.friend_dao.insert_request(&req).await? {
            // 并发发送时唯一索引拦下了第二条
            debug!("[FriendService] pending 申请已存在，返回已有记录");
            return self
                .friend_dao
                .find_pending(&viewer.uid, subject_uid)
                .await?
                .ok_or_else(|| SphereError::transition(RelationState::None, RelationState::Sent).into());
        }

        info!("[FriendService] 📨 {} 向 {} 发送好友申请", viewer.uid, subject_uid);
        self.notify_incoming(subject_uid).await?;
        Ok(req)
    }

    /// sent → none：撤回自己发出的 pending 申请
    pub async fn cancel_request(&self, viewer: &Principal, subject_uid: &str) -> Result<()> {
        let Some(req) = self.friend_dao.find_pending(&viewer.uid, subject_uid).await? else {
            let state = self.relation_state(viewer, subject_uid).await?;
            return Err(SphereError::transition(state, RelationState::None).into());
        };
        if !self.friend_dao.delete_pending_request(&req.request_id).await? {
            return Err(SphereError::transition("resolved", RelationState::None).into());
        }
        info!("[FriendService] {} 撤回了发给 {} 的申请", viewer.uid, subject_uid);
        self.notify_incoming(subject_uid).await
    }

    /// received → friends：接受 subject 发来的申请
    pub async fn accept_request(&self, viewer: &Principal, subject_uid: &str) -> Result<()> {
        let req = self.pending_from(viewer, subject_uid, RelationState::Friends).await?;
        self.accept_request_by_id(viewer, &req.request_id).await
    }

    /// received → none：拒绝 subject 发来的申请
    pub async fn decline_request(&self, viewer: &Principal, subject_uid: &str) -> Result<()> {
        let req = self.pending_from(viewer, subject_uid, RelationState::None).await?;
        self.decline_request_by_id(viewer, &req.request_id).await
    }

    /// 按申请 id 接受（通知页使用），仅收件人可操作
    pub async fn accept_request_by_id(&self, viewer: &Principal, request_id: &str) -> Result<()> {
        let req = self.load_addressed_request(viewer, request_id).await?;
        if req.status != RequestStatus::Pending {
            return Err(SphereError::transition(req.status, RequestStatus::Accepted).into());
        }

        let now = now_millis();
        let sender = self.user_dao.get_user(&req.from_uid).await?;
        let me = self.user_dao.get_user(&viewer.uid).await?;

        let my_edge = FriendEdge {
            owner_uid: viewer.uid.clone(),
            friend_uid: req.from_uid.clone(),
            name: sender
                .as_ref()
                .map(|u| u.name.clone())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| req.from_name.clone()),
            avatar: sender.map(|u| u.avatar).unwrap_or_default(),
            added_time: now,
        };
        let their_edge = FriendEdge {
            owner_uid: req.from_uid.clone(),
            friend_uid: viewer.uid.clone(),
            name: me
                .as_ref()
                .map(|u| u.name.clone())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| {
                    if viewer.display_name.trim().is_empty() {
                        "Anonymous".to_string()
                    } else {
                        viewer.display_name.clone()
                    }
                }),
            avatar: me
                .map(|u| u.avatar)
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| viewer.photo_url.clone()),
            added_time: now,
        };

        if !self
            .friend_dao
            .accept_request(&req.request_id, [&my_edge, &their_edge], now)
            .await?
        {
            // 读取与事务之间被别人处理掉了
            return Err(SphereError::transition("resolved", RequestStatus::Accepted).into());
        }

        info!("[FriendService] 🤝 {} 接受了 {} 的好友申请", viewer.uid, req.from_uid);
        self.notify_incoming(&viewer.uid).await?;
        self.notify_friends(&viewer.uid).await?;
        self.notify_friends(&req.from_uid).await
    }

    /// 按申请 id 拒绝，仅收件人可操作
    pub async fn decline_request_by_id(&self, viewer: &Principal, request_id: &str) -> Result<()> {
        let req = self.load_addressed_request(viewer, request_id).await?;
        if req.status != RequestStatus::Pending
            || !self.friend_dao.decline_request(request_id, now_millis()).await?
        {
            return Err(SphereError::transition(req.status, RequestStatus::Declined).into());
        }
        info!("[FriendService] {} 拒绝了 {} 的好友申请", viewer.uid, req.from_uid);
        self.notify_incoming(&viewer.uid).await
    }

    /// 解除好友关系（两侧一起删除）
    pub async fn remove_friend(&self, viewer: &Principal, friend_uid: &str) -> Result<()> {
        let removed = self.friend_dao.remove_friend(&viewer.uid, friend_uid).await?;
        if removed == 0 {
            return Err(SphereError::not_found("friend", friend_uid).into());
        }
        info!("[FriendService] {} 与 {} 解除好友关系", viewer.uid, friend_uid);
        self.notify_friends(&viewer.uid).await?;
        self.notify_friends(friend_uid).await
    }

    pub async fn list_friends(&self, uid: &str) -> Result<Vec<FriendEdge>> {
        self.friend_dao.list_friends(uid).await
    }

    /// 收到的 pending 申请
    pub async fn incoming_requests(&self, uid: &str) -> Result<Vec<FriendRequest>> {
        self.friend_dao.list_incoming_pending(uid).await
    }

    /// 订阅收件箱：每次申请变动都会推送完整的 pending 列表
    pub async fn subscribe_incoming_requests(&self, uid: &str) -> Result<watch::Receiver<Vec<FriendRequest>>> {
        self.incoming_hub
            .subscribe_with(uid, || self.friend_dao.list_incoming_pending(uid))
            .await
    }

    async fn pending_from(
        &self,
        viewer: &Principal,
        subject_uid: &str,
        target: RelationState,
    ) -> Result<FriendRequest> {
        match self.friend_dao.find_pending(subject_uid, &viewer.uid).await? {
            Some(req) => Ok(req),
            None => {
                let state = self.relation_state(viewer, subject_uid).await?;
                Err(SphereError::transition(state, target).into())
            }
        }
    }

    async fn load_addressed_request(&self, viewer: &Principal, request_id: &str) -> Result<FriendRequest> {
        let req = self
            .friend_dao
            .get_request(request_id)
            .await?
            .ok_or_else(|| SphereError::not_found("friend_request", request_id))?;
        if req.to_uid != viewer.uid {
            return Err(SphereError::Forbidden("只有申请的接收者可以处理该申请".into()).into());
        }
        Ok(req)
    }

    async fn notify_incoming(&self, to_uid: &str) -> Result<()> {
        let pending = self
            .incoming_hub
            .reload(to_uid, || self.friend_dao.list_incoming_pending(to_uid))
            .await?;
        if let Ok(json) = serde_json::to_string(&pending) {
            self.listener
                .on_friend_request_list_changed(to_uid.to_string(), json)
                .await;
        }
        Ok(())
    }

    async fn notify_friends(&self, owner_uid: &str) -> Result<()> {
        let friends = self.friend_dao.list_friends(owner_uid).await?;
        if let Ok(json) = serde_json::to_string(&friends) {
            self.listener
                .on_friend_list_changed(owner_uid.to_string(), json)
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::db::create_memory_pool;
    use crate::sphere::db::tests::file_pool;
    use crate::sphere::error::sphere_error;
    use crate::sphere::user::UserService;
    use async_trait::async_trait;
    use std::sync::Mutex;

    async fn setup() -> (RelationshipService, Principal, Principal) {
        let db = create_memory_pool().await.unwrap();
        let users = UserService::new(db.clone());
        let alice = Principal::new("alice", "alice@x.io", "Alice");
        let bob = Principal::new("bob", "bob@x.io", "Bob");
        users.ensure_profile(&alice).await.unwrap();
        users.ensure_profile(&bob).await.unwrap();
        (RelationshipService::new(db), alice, bob)
    }

    fn transition_of(err: &anyhow::Error) -> Option<(String, String)> {
        match sphere_error(err) {
            Some(SphereError::InvalidTransition { from, to }) => Some((from.clone(), to.clone())),
            _ => None,
        }
    }

    #[tokio::test]
    async fn accept_creates_both_edges() {
        let (svc, alice, bob) = setup().await;

        let req = svc.send_request(&alice, "bob").await.unwrap();
        assert_eq!(svc.relation_state(&alice, "bob").await.unwrap(), RelationState::Sent);
        assert_eq!(svc.relation_state(&bob, "alice").await.unwrap(), RelationState::Received);

        svc.accept_request(&bob, "alice").await.unwrap();

        assert!(svc.friend_dao.get_friend("alice", "bob").await.unwrap().is_some());
        assert!(svc.friend_dao.get_friend("bob", "alice").await.unwrap().is_some());
        let stored = svc.friend_dao.get_request(&req.request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Accepted);
        assert_eq!(svc.relation_state(&alice, "bob").await.unwrap(), RelationState::Friends);
        assert_eq!(svc.relation_state(&bob, "alice").await.unwrap(), RelationState::Friends);

        // 边上保存的是对方的展示名
        let edge = svc.friend_dao.get_friend("bob", "alice").await.unwrap().unwrap();
        assert_eq!(edge.name, "Alice");
    }

    #[tokio::test]
    async fn cancel_returns_to_none() {
        let (svc, alice, _bob) = setup().await;
        svc.send_request(&alice, "bob").await.unwrap();
        svc.cancel_request(&alice, "bob").await.unwrap();

        assert_eq!(svc.relation_state(&alice, "bob").await.unwrap(), RelationState::None);
        assert!(svc.incoming_requests("bob").await.unwrap().is_empty());

        // 已撤回后再撤回属于非法迁移
        let err = svc.cancel_request(&alice, "bob").await.unwrap_err();
        assert_eq!(transition_of(&err), Some(("none".into(), "none".into())));
    }

    #[tokio::test]
    async fn double_accept_does_not_duplicate_edges() {
        let (svc, alice, bob) = setup().await;
        let req = svc.send_request(&alice, "bob").await.unwrap();
        svc.accept_request_by_id(&bob, &req.request_id).await.unwrap();

        let err = svc.accept_request_by_id(&bob, &req.request_id).await.unwrap_err();
        assert_eq!(transition_of(&err), Some(("accepted".into(), "accepted".into())));

        assert_eq!(svc.list_friends("alice").await.unwrap().len(), 1);
        assert_eq!(svc.list_friends("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_pending_request_is_not_created() {
        let (svc, alice, _bob) = setup().await;
        let first = svc.send_request(&alice, "bob").await.unwrap();
        let second = svc.send_request(&alice, "bob").await.unwrap();
        assert_eq!(first.request_id, second.request_id);
        assert_eq!(svc.incoming_requests("bob").await.unwrap().len(), 1);

        // 唯一索引兜底：绕过状态检查直接插入也会被拦下
        let mut raw = first.clone();
        raw.request_id = generate_doc_id();
        assert!(!svc.friend_dao.insert_request(&raw).await.unwrap());
    }

    #[tokio::test]
    async fn decline_is_terminal_and_allows_new_request() {
        let (svc, alice, bob) = setup().await;
        let first = svc.send_request(&alice, "bob").await.unwrap();
        svc.decline_request(&bob, "alice").await.unwrap();

        assert_eq!(svc.relation_state(&alice, "bob").await.unwrap(), RelationState::None);
        assert!(svc.list_friends("bob").await.unwrap().is_empty());

        let err = svc.accept_request_by_id(&bob, &first.request_id).await.unwrap_err();
        assert_eq!(transition_of(&err), Some(("declined".into(), "accepted".into())));

        let second = svc.send_request(&alice, "bob").await.unwrap();
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn only_recipient_may_accept() {
        let (svc, alice, _bob) = setup().await;
        let req = svc.send_request(&alice, "bob").await.unwrap();
        let err = svc.accept_request_by_id(&alice, &req.request_id).await.unwrap_err();
        assert!(matches!(sphere_error(&err), Some(SphereError::Forbidden(_))));
    }

    #[tokio::test]
    async fn send_guards() {
        let (svc, alice, bob) = setup().await;
        assert_eq!(svc.relation_state(&alice, "alice").await.unwrap(), RelationState::OwnProfile);

        let err = svc.send_request(&alice, "alice").await.unwrap_err();
        assert!(matches!(sphere_error(&err), Some(SphereError::Validation(_))));

        let err = svc.send_request(&alice, "ghost").await.unwrap_err();
        assert!(matches!(sphere_error(&err), Some(SphereError::NotFound { .. })));

        // 对方已向我发出申请时不能再反向发送
        svc.send_request(&bob, "alice").await.unwrap();
        let err = svc.send_request(&alice, "bob").await.unwrap_err();
        assert_eq!(transition_of(&err), Some(("received".into(), "sent".into())));
    }

    #[tokio::test]
    async fn remove_friend_deletes_both_halves() {
        let (svc, alice, bob) = setup().await;
        svc.send_request(&alice, "bob").await.unwrap();
        svc.accept_request(&bob, "alice").await.unwrap();

        svc.remove_friend(&alice, "bob").await.unwrap();
        assert_eq!(svc.relation_state(&bob, "alice").await.unwrap(), RelationState::None);

        let err = svc.remove_friend(&alice, "bob").await.unwrap_err();
        assert!(matches!(sphere_error(&err), Some(SphereError::NotFound { .. })));
    }

    #[tokio::test]
    async fn incoming_subscription_gets_full_snapshots() {
        let (svc, alice, bob) = setup().await;
        let mut rx = svc.subscribe_incoming_requests("bob").await.unwrap();
        assert!(rx.borrow().is_empty());

        svc.send_request(&alice, "bob").await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        svc.accept_request(&bob, "alice").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_empty());
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FriendListener for RecordingListener {
        async fn on_friend_list_changed(&self, owner_uid: String, _friends_json: String) {
            self.events.lock().unwrap().push(format!("friends:{}", owner_uid));
        }

        async fn on_friend_request_list_changed(&self, to_uid: String, _requests_json: String) {
            self.events.lock().unwrap().push(format!("requests:{}", to_uid));
        }
    }

    #[tokio::test]
    async fn listener_sees_request_and_friend_changes() {
        let db = create_memory_pool().await.unwrap();
        let users = UserService::new(db.clone());
        let alice = Principal::new("alice", "alice@x.io", "Alice");
        let bob = Principal::new("bob", "bob@x.io", "Bob");
        users.ensure_profile(&alice).await.unwrap();
        users.ensure_profile(&bob).await.unwrap();

        let listener = Arc::new(RecordingListener::default());
        let svc = RelationshipService::with_listener(db, listener.clone());
        svc.send_request(&alice, "bob").await.unwrap();
        svc.accept_request(&bob, "alice").await.unwrap();

        let events = listener.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["requests:bob", "requests:bob", "friends:bob", "friends:alice"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_leave_one_pending_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_pool(dir.path()).await;
        let users = UserService::new(db.clone());
        let alice = Principal::new("alice", "alice@x.io", "Alice");
        let bob = Principal::new("bob", "bob@x.io", "Bob");
        users.ensure_profile(&alice).await.unwrap();
        users.ensure_profile(&bob).await.unwrap();
        let svc = Arc::new(RelationshipService::new(db.clone()));

        let first = {
            let (svc, alice) = (svc.clone(), alice.clone());
            tokio::spawn(async move { svc.send_request(&alice, "bob").await })
        };
        let second = {
            let (svc, alice) = (svc.clone(), alice.clone());
            tokio::spawn(async move { svc.send_request(&alice, "bob").await })
        };
        let (first, second) = tokio::join!(first, second);
        let (first, second) = (first.unwrap().unwrap(), second.unwrap().unwrap());
        assert_eq!(first.request_id, second.request_id);

        let (pending,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM friend_requests WHERE from_uid = 'alice' AND to_uid = 'bob' AND status = 'pending'",
        )
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(pending, 1);
        assert_eq!(svc.relation_state(&bob, "alice").await.unwrap(), RelationState::Received);
    }
}
