//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，可用 RUST_LOG 覆盖；重复调用（嵌入方与测试）不会 panic。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅器；已安装时返回 false
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .is_ok()
}
