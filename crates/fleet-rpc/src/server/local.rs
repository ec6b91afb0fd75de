use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tracing::trace;

use crate::error::{RpcError, TransportError};
use crate::future::RpcFuture;
use crate::invocation::{Channel, RequestEnvelope};

use super::dispatcher::RpcDispatcher;

/// 进程内回环通道：把请求直接交给本地 [`RpcDispatcher`]。
///
/// 用于测试与单进程部署；超时字段被忽略，因为调度在调用方轮询 Future 时同步完成。
pub struct LocalChannel {
    dispatcher: Arc<RpcDispatcher>,
    peer: String,
    connected: AtomicBool,
}

impl LocalChannel {
    pub fn new(dispatcher: Arc<RpcDispatcher>, peer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            peer: peer.into(),
            connected: AtomicBool::new(true),
        })
    }

    /// 标记断开；之后的调用在发送前即失败。
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::Release);
    }
}

impl Channel for LocalChannel {
    fn send_query(&self, request: RequestEnvelope) -> RpcFuture<Vec<u8>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let peer = self.peer.clone();
        async move {
            trace!(%peer, bytes = request.payload.len(), "local query");
            dispatcher.dispatch(&request.payload).ok_or_else(|| {
                RpcError::from(TransportError::Io {
                    detail: format!("`{peer}` produced no response"),
                })
            })
        }
        .boxed()
    }

    fn send(&self, request: RequestEnvelope) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected {
                peer: self.peer.clone(),
            });
        }
        trace!(peer = %self.peer, bytes = request.payload.len(), "local send");
        let _ = self.dispatcher.dispatch(&request.payload);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

impl std::fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChannel")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish()
    }
}
