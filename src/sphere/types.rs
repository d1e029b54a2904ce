//! 通用工具：时间戳、文档 ID、文本校验

use crate::sphere::error::SphereError;
use chrono::Utc;

/// 当前时间（毫秒），作为"服务器时间戳"写入文档
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 生成文档 ID（无连字符的 UUID v4）
pub fn generate_doc_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 去掉首尾空白后要求非空，返回裁剪后的文本
pub fn require_text(field: &str, value: &str) -> Result<String, SphereError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SphereError::Validation(format!("{} 不能为空", field)));
    }
    Ok(trimmed.to_string())
}
