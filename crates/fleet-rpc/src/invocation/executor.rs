use std::sync::Arc;

use futures::FutureExt;
use futures::future;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{CodecError, RpcError, RpcResult, TransportError};
use crate::future::RpcFuture;

use super::chain::RpcChain;
use super::channel::{Channel, RequestEnvelope};
use super::codec::{WireRequest, WireResponse};
use super::rpc::Rpc;

/// 可发送的调用：单个调用或整条调用链。
#[derive(Clone, Debug)]
pub enum Invocation {
    Single(Rpc),
    Chain(RpcChain),
}

impl Invocation {
    pub fn target(self, channel: Arc<dyn Channel>) -> RpcExecutable {
        RpcExecutable {
            invocation: self,
            channel,
        }
    }

    /// 终端调用，决定编解码器与超时。
    pub fn terminal(&self) -> &Rpc {
        match self {
            Invocation::Single(rpc) => rpc,
            Invocation::Chain(chain) => chain.last(),
        }
    }

    fn root(&self) -> &Rpc {
        match self {
            Invocation::Single(rpc) => rpc,
            Invocation::Chain(chain) => chain.root(),
        }
    }

    /// 转换为线上请求；实参在此时才被序列化。
    pub fn to_wire(&self, expects_result: bool) -> Result<WireRequest, CodecError> {
        let frames = match self {
            Invocation::Single(rpc) => vec![rpc.frame()?],
            Invocation::Chain(chain) => chain
                .iter()
                .map(Rpc::frame)
                .collect::<Result<Vec<_>, CodecError>>()?,
        };
        Ok(WireRequest {
            target: self.root().contract().to_owned(),
            frames,
            expects_result,
        })
    }
}

impl From<Rpc> for Invocation {
    fn from(rpc: Rpc) -> Self {
        Invocation::Single(rpc)
    }
}

impl From<RpcChain> for Invocation {
    fn from(chain: RpcChain) -> Self {
        Invocation::Chain(chain)
    }
}

/// 绑定到通道的调用。
///
/// # 教案式说明
/// - **意图 (Why)**：同一份调用描述可以按三种方式发送，由合成阶段确定的调用模式选择其一；
/// - **契约 (What)**：
///   - [`fire_sync`](Self::fire_sync) 阻塞当前线程直到关联响应、失败或通道超时；
///   - [`fire`](Self::fire) 立即返回 Future，不阻塞调用者；
///   - [`fire_and_forget`](Self::fire_and_forget) 单向发送，没有完成信号；
/// - **风险 (Trade-offs)**：引擎本身不提供取消原语，需要取消时由调用方丢弃 Future 或在通道层实现。
pub struct RpcExecutable {
    invocation: Invocation,
    channel: Arc<dyn Channel>,
}

impl RpcExecutable {
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn fire_sync(&self) -> RpcResult<Value> {
        futures::executor::block_on(self.fire())
    }

    pub fn fire(&self) -> RpcFuture<Value> {
        let envelope = match self.envelope(true) {
            Ok(envelope) => envelope,
            Err(err) => return future::ready(Err(err)).boxed(),
        };

        let terminal = self.invocation.terminal();
        let serializer = Arc::clone(terminal.serializer());
        let method = terminal.method().to_owned();
        let response = self.channel.send_query(envelope);

        async move {
            let bytes = response.await?;
            match serializer.decode_response(&bytes)? {
                WireResponse::Success { value } => Ok(value),
                WireResponse::Failure { code, message } => {
                    warn!(method = %method, code = %code, "remote invocation failed");
                    Err(RpcError::Remote { code, message })
                }
            }
        }
        .boxed()
    }

    pub fn fire_and_forget(&self) -> RpcResult<()> {
        let envelope = self.envelope(false)?;
        self.channel.send(envelope)?;
        Ok(())
    }

    fn envelope(&self, expects_response: bool) -> RpcResult<RequestEnvelope> {
        if !self.channel.is_connected() {
            return Err(TransportError::Disconnected {
                peer: self.channel.peer().to_owned(),
            }
            .into());
        }

        let terminal = self.invocation.terminal();
        let request = self.invocation.to_wire(expects_response)?;
        let payload = terminal.serializer().encode_request(&request)?;
        trace!(
            target_contract = %request.target,
            method = terminal.method(),
            frames = request.frames.len(),
            bytes = payload.len(),
            expects_response,
            "firing rpc"
        );
        Ok(RequestEnvelope {
            payload,
            timeout: terminal.timeout(),
            expects_response,
        })
    }
}
