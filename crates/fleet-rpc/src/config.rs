//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 以声明式配置描述引擎的可调参数：生成缓存的空闲过期时长、默认调用超时、
//!   是否默认实现具体方法；
//! - 配置可由上层编排进程从 TOML 片段加载，也可直接以代码构造。
//!
//! ## 设计要求（What）
//! - 所有字段都有默认值，缺省片段即得到与 [`RpcConfig::default`] 一致的配置；
//! - 加载后立即校验，非法取值（如 0 秒空闲期）返回 [`ConfigError`]，不会延迟到运行期。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::GenerationFlags;

/// 缓存条目的默认空闲过期时长：8 小时。
pub const DEFAULT_CACHE_IDLE_SECS: u64 = 8 * 60 * 60;

/// 配置加载或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse rpc configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid rpc configuration `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// 引擎配置根节点。
///
/// # 契约说明（What）
/// - `cache`：生成缓存参数；
/// - `invocation`：调用默认参数；
/// - 反序列化时未知字段被拒绝，防止拼写错误悄悄失效。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcConfig {
    pub cache: CacheConfig,
    pub invocation: InvocationConfig,
}

/// 生成缓存参数。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// 条目最近一次被查找或分配之后，经过多少秒视为过期。
    pub idle_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_CACHE_IDLE_SECS,
        }
    }
}

/// 调用默认参数。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvocationConfig {
    /// 契约未声明超时时使用的默认超时（毫秒）；缺省表示完全交给通道决定。
    pub default_timeout_ms: Option<u64>,
    /// 构建器默认是否实现契约中的具体方法。
    pub implement_concrete_methods: bool,
}

impl RpcConfig {
    /// 从 TOML 文本加载并校验配置。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: RpcConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.idle_timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.invocation.default_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                key: "invocation.default_timeout_ms",
                reason: "must be greater than zero when set".to_owned(),
            });
        }
        Ok(())
    }

    /// 缓存空闲过期时长。
    pub fn cache_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.cache.idle_timeout_secs)
    }

    /// 默认调用超时。
    pub fn default_timeout(&self) -> Option<Duration> {
        self.invocation.default_timeout_ms.map(Duration::from_millis)
    }

    /// 构建器使用的默认生成标志。
    pub fn default_generation_flags(&self) -> GenerationFlags {
        if self.invocation.implement_concrete_methods {
            GenerationFlags::IMPLEMENT_CONCRETE
        } else {
            GenerationFlags::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let config = RpcConfig::from_toml_str("").expect("empty config must parse");
        assert_eq!(config, RpcConfig::default());
        assert_eq!(config.cache_idle_timeout(), Duration::from_secs(8 * 60 * 60));
        assert_eq!(config.default_timeout(), None);
    }

    #[test]
    fn parses_all_sections() {
        let config = RpcConfig::from_toml_str(
            r#"
            [cache]
            idle_timeout_secs = 60

            [invocation]
            default_timeout_ms = 2500
            implement_concrete_methods = true
            "#,
        )
        .expect("config must parse");
        assert_eq!(config.cache_idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(2500)));
        assert!(
            config
                .default_generation_flags()
                .contains(GenerationFlags::IMPLEMENT_CONCRETE)
        );
    }

    #[test]
    fn rejects_zero_idle_timeout_and_unknown_keys() {
        let err = RpcConfig::from_toml_str("[cache]\nidle_timeout_secs = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "cache.idle_timeout_secs",
                ..
            }
        ));
        assert!(matches!(
            RpcConfig::from_toml_str("[cache]\nidle = 3").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
