//! 好友监听器回调接口

use async_trait::async_trait;

/// 好友监听器回调接口
#[async_trait]
pub trait FriendListener: Send + Sync {
    /// 好友列表发生变更（新增或删除），参数为该用户当前好友 JSON 数组
    async fn on_friend_list_changed(&self, owner_uid: String, friends_json: String);

    /// 待处理好友申请发生变更，参数为收件人当前 pending 申请 JSON 数组
    async fn on_friend_request_list_changed(&self, to_uid: String, requests_json: String);
}

/// 默认空实现（无操作）
pub struct EmptyFriendListener;

#[async_trait]
impl FriendListener for EmptyFriendListener {
    async fn on_friend_list_changed(&self, _owner_uid: String, _friends_json: String) {}

    async fn on_friend_request_list_changed(&self, _to_uid: String, _requests_json: String) {}
}
