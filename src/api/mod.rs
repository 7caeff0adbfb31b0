//! 对外接口
//!
//! - `sdk`: [`WebCore`] 组合根，驱动应用生命周期

pub mod sdk;

pub use sdk::{CoreState, WebCore};
