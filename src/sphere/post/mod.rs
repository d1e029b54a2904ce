//! 动态（帖子）模块
//!
//! 帖子、评论、点赞集合的增删改，以及帖子配图的文件存储

pub mod blob;
pub mod dao;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use blob::{BlobStore, LocalBlobStore};
pub use dao::PostDao;
pub use models::{Comment, NewPost, Post, PostImage};
pub use service::PostService;
