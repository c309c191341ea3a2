//! 导航 ID 生成
//!
//! 每一次路由导航都会分配一个 10 位 62 进制 ID（0-9, a-z, A-Z），
//! 用于在日志中串联同一次导航内的卸载与挂载。

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// 62 进制字符集
const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// ID 长度
pub const NAVIGATION_ID_LENGTH: usize = 10;

/// 生成导航 ID
///
/// 时间戳与随机数异或后转换为 62 进制。
///
/// # Example
///
/// ```
/// use chips_portal::utils::id::generate_navigation_id;
///
/// let id = generate_navigation_id();
/// assert_eq!(id.len(), 10);
/// ```
pub fn generate_navigation_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let random: u64 = rand::thread_rng().gen();

    let mut value = timestamp ^ random;
    let mut id = [0u8; NAVIGATION_ID_LENGTH];
    for slot in id.iter_mut().rev() {
        *slot = BASE62_CHARS[(value % 62) as usize];
        value /= 62;
    }

    id.iter().map(|&b| b as char).collect()
}

/// 校验导航 ID 格式
///
/// ```
/// use chips_portal::utils::id::is_valid_navigation_id;
///
/// assert!(is_valid_navigation_id("a1B2c3D4e5"));
/// assert!(!is_valid_navigation_id("nav-1"));
/// ```
pub fn is_valid_navigation_id(id: &str) -> bool {
    id.len() == NAVIGATION_ID_LENGTH && id.chars().all(|c| c.is_ascii_alphanumeric())
}
