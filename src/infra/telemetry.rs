//! Diagnostic logging setup.
//!
//! User-facing progress goes through the console sink; this subscriber only
//! carries `tracing` diagnostics to stderr, filtered by `RUST_LOG`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
/// Only the first call takes effect.
///
/// 安装全局订阅者。设置了 `RUST_LOG` 时优先于 `level`。仅第一次调用生效。
pub fn init_tracing(level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}
