pub mod sphere;

// 重新导出常用类型，方便外部使用
pub use sphere::{
    auth::{IdentityProvider, Principal, RestIdentityProvider, SessionManager},
    client::{ClientConfig, SphereClient},
    error::SphereError,
    friend::RelationState,
};
