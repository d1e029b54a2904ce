//! 文件存储
//!
//! 按路径寻址的对象上传，返回可访问的下载 URL

use crate::sphere::error::SphereError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 上传对象，返回下载 URL
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<String>;

    /// 删除对象（不存在时视为成功）
    async fn delete(&self, path: &str) -> Result<()>;
}

/// 帖子配图路径：posts/{uid}/{millis}-{filename}
///
/// 文件名中除字母数字、`.`、`-`、`_` 外的字符替换为 `_`。
pub fn post_image_path(uid: &str, millis: i64, file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("posts/{}/{}-{}", uid, millis, sanitized)
}

/// 本地目录实现的文件存储
pub struct LocalBlobStore {
    root: PathBuf,
    /// 对外访问前缀；为空时返回 file:// URL
    base_url: Option<String>,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(SphereError::Blob(format!("非法的对象路径: {}", path)).into());
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<String> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("创建目录失败: {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .context(format!("写入文件失败: {}", target.display()))?;
        info!("[Blob] 📤 已上传 {} ({} 字节)", path, bytes.len());

        let url = match &self.base_url {
            Some(base) => format!("{}/{}", base, path),
            None => {
                let abs = tokio::fs::canonicalize(&target)
                    .await
                    .context("解析文件绝对路径失败")?;
                format!("file://{}", abs.display())
            }
        };
        Ok(url)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                debug!("[Blob] 已删除 {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("删除文件失败: {}", target.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_is_sanitized() {
        assert_eq!(
            post_image_path("u1", 42, "my cat/../x.png"),
            "posts/u1/42-my_cat_.._x.png"
        );
    }

    #[tokio::test]
    async fn upload_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), Some("https://cdn.example.com/".into()));

        let url = store.upload("posts/u1/1-a.png", b"png").await.unwrap();
        assert_eq!(url, "https://cdn.example.com/posts/u1/1-a.png");
        let on_disk = dir.path().join("posts/u1/1-a.png");
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"png");

        store.delete("posts/u1/1-a.png").await.unwrap();
        assert!(!on_disk.exists());
        // 重复删除不报错
        store.delete("posts/u1/1-a.png").await.unwrap();
    }

    #[tokio::test]
    async fn file_url_without_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), None);
        let url = store.upload("posts/u1/1-a.png", b"x").await.unwrap();
        assert!(url.starts_with("file://"), "{}", url);
        assert!(url.ends_with("posts/u1/1-a.png"), "{}", url);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), None);
        let err = store.upload("posts/../../etc/passwd", b"x").await.unwrap_err();
        assert!(matches!(
            crate::sphere::error::sphere_error(&err),
            Some(SphereError::Blob(_))
        ));
    }
}
