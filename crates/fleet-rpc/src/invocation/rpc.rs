use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::descriptor::Signature;
use crate::error::CodecError;

use super::argument::Arg;
use super::channel::Channel;
use super::codec::{InvocationFrame, Serializer};
use super::executor::{Invocation, RpcExecutable};

/// 一次待发送的远程调用，与目的地无关。
///
/// 每次调用都新建；实参以共享引用保存，克隆开销固定。
#[derive(Clone)]
pub struct Rpc {
    contract: Arc<str>,
    method: Arc<str>,
    signature: Signature,
    args: Arc<[Arg]>,
    expects_result: bool,
    timeout: Option<Duration>,
    serializer: Arc<dyn Serializer>,
}

impl Rpc {
    pub(crate) fn new(
        contract: Arc<str>,
        method: Arc<str>,
        signature: Signature,
        args: Vec<Arg>,
        expects_result: bool,
        timeout: Option<Duration>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self {
            contract,
            method,
            signature,
            args: Arc::from(args),
            expects_result,
            timeout,
            serializer,
        }
    }

    /// 所属契约名称。
    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// 声明上是否等待结果（单向操作为 `false`）。
    pub fn expects_result(&self) -> bool {
        self.expects_result
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    /// 绑定到通道，得到可发送的调用。
    pub fn target(&self, channel: Arc<dyn Channel>) -> RpcExecutable {
        Invocation::Single(self.clone()).target(channel)
    }

    pub(crate) fn frame(&self) -> Result<InvocationFrame, CodecError> {
        let args = self
            .args
            .iter()
            .map(Arg::marshal)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InvocationFrame {
            contract: self.contract.to_string(),
            method: self.method.to_string(),
            signature: self.signature.to_string(),
            args,
        })
    }
}

impl fmt::Debug for Rpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpc")
            .field("contract", &self.contract)
            .field("method", &self.method)
            .field("signature", &self.signature)
            .field("args", &self.args)
            .field("expects_result", &self.expects_result)
            .field("timeout", &self.timeout)
            .field("serializer", &self.serializer.name())
            .finish()
    }
}
