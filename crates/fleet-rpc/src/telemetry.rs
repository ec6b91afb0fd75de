//! 日志订阅器安装入口。
//!
//! 引擎内部只通过 `tracing` 宏发出事件（合成 `debug`、发送 `trace`、失败 `warn`），
//! 不主动安装订阅器；宿主进程可调用 [`install_fmt_subscriber`] 获得与编排层一致的文本输出。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 安装订阅器失败。
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter `{filter}`: {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// 以 `filter`（`EnvFilter` 语法，例如 `"fleet_rpc=debug"`）安装全局 fmt 订阅器。
///
/// - 环境变量 `RUST_LOG` 存在时优先使用；
/// - 已有全局订阅器时返回 [`TelemetryError::AlreadyInstalled`]，不会覆盖。
pub fn install_fmt_subscriber(filter: &str) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter).map_err(|source| TelemetryError::Filter {
            filter: filter.to_owned(),
            source,
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInstalled)
}
