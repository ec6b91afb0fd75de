use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::future::RpcFuture;

/// 交给通道发送的请求。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// 序列化器产出的请求字节。
    pub payload: Vec<u8>,
    /// 本次调用的超时；通道负责执行。
    pub timeout: Option<Duration>,
    /// 是否需要关联响应。
    pub expects_response: bool,
}

/// 传输通道。
///
/// # 教案式说明
/// - **意图 (Why)**：引擎不关心帧格式、连接管理与超时实现，只依赖“发送一条请求并拿到关联响应”；
/// - **契约 (What)**：
///   - `send_query` 返回在关联响应到达、通道失败或 `timeout` 到期时完成的 Future，
///     调用本身不得阻塞；
///   - `send` 为单向发送，返回即表示请求已交给传输层；
///   - `is_connected` 为 `false` 时引擎直接报告 [`TransportError::Disconnected`]；
/// - **风险 (Trade-offs)**：引擎不做重试，传输失败原样上抛。
pub trait Channel: Send + Sync + 'static {
    fn send_query(&self, request: RequestEnvelope) -> RpcFuture<Vec<u8>>;

    fn send(&self, request: RequestEnvelope) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool {
        true
    }

    /// 对端标识，用于日志与错误信息。
    fn peer(&self) -> &str {
        "unknown"
    }
}

type SupplierFn = dyn Fn() -> Result<Arc<dyn Channel>, TransportError> + Send + Sync;

/// 通道供应器：每次调用时解析目标通道，从不在生成期解析。
#[derive(Clone)]
pub struct ChannelSupplier(Arc<SupplierFn>);

impl ChannelSupplier {
    /// 总是返回同一条通道。
    pub fn fixed(channel: Arc<dyn Channel>) -> Self {
        Self(Arc::new(move || Ok(Arc::clone(&channel))))
    }

    /// 以闭包解析通道，例如“集群中第一条可用连接”。
    pub fn from_fn<F>(resolve: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Channel>, TransportError> + Send + Sync + 'static,
    {
        Self(Arc::new(resolve))
    }

    pub fn resolve(&self) -> Result<Arc<dyn Channel>, TransportError> {
        (self.0)()
    }

    pub fn ptr_eq(&self, other: &ChannelSupplier) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ChannelSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelSupplier")
    }
}
