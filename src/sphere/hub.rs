//! 实时快照分发
//!
//! 每个 key（会话、群组、收件箱等）对应一个 `watch` 通道。每次写入后由服务层
//! 重新查询完整有序快照并推送给所有订阅者，不做增量补丁。
//! 订阅者丢弃 `Receiver` 即视为取消订阅，刷新时顺带清理无人订阅的通道。
//!
//! 同一个 hub 上的快照读取与推送在 `refresh_gate` 下串行执行：后推送的快照
//! 一定是在前一次读取之后读到的，订阅者看到的快照不会倒退。

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

pub struct SnapshotHub<T> {
    name: &'static str,
    channels: Mutex<HashMap<String, watch::Sender<T>>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl<T: Clone + Send + Sync + 'static> SnapshotHub<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            channels: Mutex::new(HashMap::new()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// 订阅 key
    ///
    /// 已有活跃订阅者时直接沿用当前快照，否则调用 `load` 读取初始快照。
    pub async fn subscribe_with<F, Fut>(&self, key: &str, load: F) -> Result<watch::Receiver<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _gate = self.refresh_gate.lock().await;
        let existing = {
            let channels = self.lock();
            channels
                .get(key)
                .filter(|s| s.receiver_count() > 0)
                .map(|s| s.subscribe())
        };
        if let Some(receiver) = existing {
            return Ok(receiver);
        }

        let snapshot = load().await?;
        let (sender, receiver) = watch::channel(snapshot);
        self.lock().insert(key.to_string(), sender);
        debug!("[Hub/{}] 新建订阅通道: {}", self.name, key);
        Ok(receiver)
    }

    /// key 上有订阅者时重新读取快照并推送，没有则只清理通道
    pub async fn refresh<F, Fut>(&self, key: &str, load: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _gate = self.refresh_gate.lock().await;
        if !self.has_subscribers(key) {
            self.prune(key);
            return Ok(());
        }
        let snapshot = load().await?;
        self.publish(key, snapshot);
        Ok(())
    }

    /// 无论是否有订阅者都读取快照，推送后返回给调用方
    pub async fn reload<F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _gate = self.refresh_gate.lock().await;
        let snapshot = load().await?;
        self.publish(key, snapshot.clone());
        Ok(snapshot)
    }

    /// key 上是否还有活跃订阅者（没有则调用方可以省掉快照查询）
    pub fn has_subscribers(&self, key: &str) -> bool {
        self.subscriber_count(key) > 0
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.lock()
            .get(key)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    fn publish(&self, key: &str, snapshot: T) {
        let mut channels = self.lock();
        let Some(sender) = channels.get(key) else {
            return;
        };
        if sender.receiver_count() == 0 {
            channels.remove(key);
            debug!("[Hub/{}] 订阅者已全部退出，移除通道: {}", self.name, key);
            return;
        }
        sender.send_replace(snapshot);
    }

    fn prune(&self, key: &str) {
        let mut channels = self.lock();
        if channels.get(key).is_some_and(|s| s.receiver_count() == 0) {
            channels.remove(key);
            debug!("[Hub/{}] 订阅者已全部退出，移除通道: {}", self.name, key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<T>>> {
        // 锁内不会 panic，中毒时直接沿用内部数据
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn refresh_reaches_every_subscriber() {
        let hub: SnapshotHub<Vec<u32>> = SnapshotHub::new("test");
        let a = hub.subscribe_with("k", || async { Ok(vec![1]) }).await.unwrap();
        let b = hub.subscribe_with("k", || async { Ok(vec![999]) }).await.unwrap();
        // 第二次订阅沿用现有快照
        assert_eq!(*b.borrow(), vec![1]);

        hub.refresh("k", || async { Ok(vec![1, 2]) }).await.unwrap();
        assert_eq!(*a.borrow(), vec![1, 2]);
        assert_eq!(*b.borrow(), vec![1, 2]);
        assert_eq!(hub.subscriber_count("k"), 2);
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let hub: SnapshotHub<u32> = SnapshotHub::new("test");
        let rx = hub.subscribe_with("k", || async { Ok(0) }).await.unwrap();
        drop(rx);
        assert!(!hub.has_subscribers("k"));

        let loads = AtomicUsize::new(0);
        hub.refresh("k", || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .await
        .unwrap();
        // 没有订阅者时不读取快照
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        // 通道已被移除，新订阅重新读取初始值
        let rx = hub.subscribe_with("k", || async { Ok(7) }).await.unwrap();
        assert_eq!(*rx.borrow(), 7);
    }

    #[tokio::test]
    async fn reload_returns_snapshot_without_subscribers() {
        let hub: SnapshotHub<u32> = SnapshotHub::new("test");
        assert_eq!(hub.reload("missing", || async { Ok(3) }).await.unwrap(), 3);
        assert_eq!(hub.subscriber_count("missing"), 0);
    }

    #[tokio::test]
    async fn slow_stale_load_cannot_overwrite_newer_snapshot() {
        let hub: Arc<SnapshotHub<usize>> = Arc::new(SnapshotHub::new("test"));
        let version = Arc::new(AtomicUsize::new(1));
        let rx = hub.subscribe_with("k", || async { Ok(0) }).await.unwrap();

        // 先读到旧版本、推送很慢的刷新
        let slow = {
            let hub = hub.clone();
            let version = version.clone();
            tokio::spawn(async move {
                hub.refresh("k", || async move {
                    let seen = version.load(Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(seen)
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // 数据更新后的刷新必须排在慢刷新之后
        version.store(2, Ordering::SeqCst);
        hub.refresh("k", || async { Ok(version.load(Ordering::SeqCst)) })
            .await
            .unwrap();
        slow.await.unwrap().unwrap();

        assert_eq!(*rx.borrow(), 2);
    }
}
