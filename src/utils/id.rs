//! ID 生成
//!
//! 订阅 ID 用短的字母数字串，事件与请求 ID 用 UUID v4。

use rand::distributions::Alphanumeric;
use rand::Rng;

const SHORT_ID_LEN: usize = 10;

/// 10 位字母数字 ID
///
/// ```
/// let id = webcore::generate_id();
/// assert_eq!(id.len(), 10);
/// ```
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_ID_LEN)
        .map(char::from)
        .collect()
}

pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
