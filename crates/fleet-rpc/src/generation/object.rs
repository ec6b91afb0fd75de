use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::descriptor::{ContractDescriptor, MappingSource, Signature};
use crate::error::{RpcError, RpcResult};
use crate::future::RpcFuture;
use crate::introspect::InvocationMode;
use crate::invocation::{Arg, ChannelSupplier, Invocation, RpcChain, RpcSender};

use super::factory::ConstructorArg;
use super::synthesis::{HandlerKind, Implementation, MethodHandler};

/// 由 `#[fleet_rpc::contract]` 生成的强类型代理实现的契约。
pub trait RemoteContract: Sized {
    /// 进程内唯一的契约名称。
    const CONTRACT_NAME: &'static str;

    /// 契约描述表。
    fn descriptor() -> Arc<ContractDescriptor>;

    /// 包装一个已合成的对象。调用方需保证对象属于本契约，见 [`RemoteObject::adopt`]。
    fn from_object(object: RemoteObject) -> Self;

    fn object(&self) -> &RemoteObject;
}

/// 一次调用的原始结果。
pub enum Outcome {
    /// 同步调用的解码结果。
    Value(Value),
    /// 异步调用的 Future。
    Pending(RpcFuture<Value>),
    /// 单向调用已交给传输层。
    Dispatched,
    /// 链式调用分配的下一个对象。
    Object(RemoteObject),
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Pending(_) => f.write_str("Pending"),
            Outcome::Dispatched => f.write_str("Dispatched"),
            Outcome::Object(object) => f.debug_tuple("Object").field(object).finish(),
        }
    }
}

struct ObjectState {
    implementation: Arc<Implementation>,
    sender: RpcSender,
    channel: ChannelSupplier,
    base: Option<RpcChain>,
    ctor_args: Vec<ConstructorArg>,
}

/// 合成出的远程对象：查调度表，把每个操作转发给远端。
///
/// # 教案式说明
/// - **意图 (Why)**：所有契约共用这一个适配器类型，差异全部来自合成期生成的 [`Implementation`]；
///   宏生成的强类型代理只是它的薄包装；
/// - **契约 (What)**：
///   - 终端调用把链基与本次调用拼接后整体发送，线上载荷总是从根开始的完整路径；
///   - 链式调用不发送任何请求，只分配下一个对象；
///   - 通道在每次调用时通过供应器解析；
///   - 对象不可变，克隆只增加引用计数，可在线程间自由共享；
/// - **风险 (Trade-offs)**：强类型结果通过 `serde` 从动态值解码，类型不符时返回
///   [`RpcError::Adaptation`]，不会在编译期发现。
#[derive(Clone)]
pub struct RemoteObject {
    inner: Arc<ObjectState>,
}

impl RemoteObject {
    pub(crate) fn new(
        implementation: Arc<Implementation>,
        sender: RpcSender,
        channel: ChannelSupplier,
        base: Option<RpcChain>,
        ctor_args: Vec<ConstructorArg>,
    ) -> Self {
        Self {
            inner: Arc::new(ObjectState {
                implementation,
                sender,
                channel,
                base,
                ctor_args,
            }),
        }
    }

    pub fn contract_name(&self) -> &str {
        self.inner.implementation.contract_name()
    }

    pub fn implementation(&self) -> &Arc<Implementation> {
        &self.inner.implementation
    }

    pub fn sender(&self) -> &RpcSender {
        &self.inner.sender
    }

    pub fn channel_supplier(&self) -> &ChannelSupplier {
        &self.inner.channel
    }

    /// 从根到本对象的调用链；根对象为 `None`。
    pub fn base_chain(&self) -> Option<&RpcChain> {
        self.inner.base.as_ref()
    }

    /// 分配时转发的用户构造参数（占位值已替换）。
    pub fn constructor_args(&self) -> &[ConstructorArg] {
        &self.inner.ctor_args
    }

    pub fn constructor_arg(&self, index: usize) -> Option<&ConstructorArg> {
        self.inner.ctor_args.get(index)
    }

    /// 以强类型代理包装本对象。
    ///
    /// 对象的契约必须是 `C` 本身或以 `C` 为祖先（例如链式返回声明的更具体实现），
    /// 否则返回 [`RpcError::ContractMismatch`]。
    pub fn adopt<C: RemoteContract>(self, method: &str) -> RpcResult<C> {
        if !self.inner.implementation.contract().conforms_to(C::CONTRACT_NAME) {
            return Err(RpcError::ContractMismatch {
                method: method.to_owned(),
                expected: C::CONTRACT_NAME.to_owned(),
                actual: self.contract_name().to_owned(),
            });
        }
        Ok(C::from_object(self))
    }

    /// 按合成期确定的方式执行一个操作。
    pub fn invoke(&self, method: &str, signature: &Signature, args: Vec<Arg>) -> RpcResult<Outcome> {
        let handler = self.handler(method, signature)?;
        let rpc = self.inner.sender.build_invocation(method, signature, args)?;
        let invocation = match &self.inner.base {
            Some(base) => Invocation::Chain(base.join(rpc)),
            None => Invocation::Single(rpc),
        };

        match &handler.kind {
            HandlerKind::Fire(mode) => {
                let channel = self.inner.channel.resolve()?;
                let executable = invocation.target(channel);
                match mode {
                    InvocationMode::Sync => executable.fire_sync().map(Outcome::Value),
                    InvocationMode::Async => Ok(Outcome::Pending(executable.fire())),
                    InvocationMode::FireAndForget => {
                        executable.fire_and_forget()?;
                        Ok(Outcome::Dispatched)
                    }
                }
            }
            HandlerKind::Chain(plan) => {
                let (chain, args) = match invocation {
                    Invocation::Chain(chain) => {
                        let args = chain.last().args().to_vec();
                        (chain, args)
                    }
                    Invocation::Single(rpc) => {
                        let args = rpc.args().to_vec();
                        (RpcChain::of(rpc), args)
                    }
                };
                let extra_args = plan
                    .sources
                    .iter()
                    .map(|source| match source {
                        MappingSource::Argument(index) => ConstructorArg::Value(args[*index].clone()),
                        MappingSource::Special(special) => ConstructorArg::Special(*special),
                    })
                    .collect();
                plan.factory
                    .construct_instance(Some(chain), self.inner.channel.clone(), extra_args)
                    .map(Outcome::Object)
            }
        }
    }

    /// 同步调用并把结果解码为 `T`。
    pub fn call<T: DeserializeOwned>(&self, method: &str, signature: &Signature, args: Vec<Arg>) -> RpcResult<T> {
        self.expect_mode(method, signature, InvocationMode::Sync)?;
        match self.invoke(method, signature, args)? {
            Outcome::Value(value) => adapt(method, value),
            other => Err(unexpected_outcome(method, &other)),
        }
    }

    /// 异步调用；Future 完成时把结果解码为 `T`。
    pub fn call_async<T>(&self, method: &str, signature: &Signature, args: Vec<Arg>) -> RpcFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let pending = self
            .expect_mode(method, signature, InvocationMode::Async)
            .and_then(|_| self.invoke(method, signature, args));
        let method = method.to_owned();
        match pending {
            Ok(Outcome::Pending(future)) => future
                .map(move |result| result.and_then(|value| adapt(&method, value)))
                .boxed(),
            Ok(other) => future::ready(Err(unexpected_outcome(&method, &other))).boxed(),
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }

    /// 单向调用，总是返回 `T::default()`。
    ///
    /// 单向调用没有完成信号；发送失败只记录日志，不影响返回值。
    pub fn call_ignored<T: Default>(&self, method: &str, signature: &Signature, args: Vec<Arg>) -> T {
        let sent = self
            .expect_mode(method, signature, InvocationMode::FireAndForget)
            .and_then(|_| self.invoke(method, signature, args));
        if let Err(err) = sent {
            warn!(
                contract = self.contract_name(),
                method,
                code = err.code(),
                error = %err,
                "fire-and-forget invocation was not sent"
            );
        }
        T::default()
    }

    /// 链式调用，返回强类型代理。
    pub fn chain<C: RemoteContract>(&self, method: &str, signature: &Signature, args: Vec<Arg>) -> RpcResult<C> {
        self.chain_object(method, signature, args)?.adopt(method)
    }

    /// 链式调用，返回下一个对象。
    pub fn chain_object(&self, method: &str, signature: &Signature, args: Vec<Arg>) -> RpcResult<RemoteObject> {
        match self.invoke(method, signature, args)? {
            Outcome::Object(object) => Ok(object),
            other => Err(unexpected_outcome(method, &other)),
        }
    }

    fn handler(&self, method: &str, signature: &Signature) -> RpcResult<&MethodHandler> {
        self.inner
            .implementation
            .handler(method, signature)
            .ok_or_else(|| RpcError::UnknownOperation {
                contract: self.contract_name().to_owned(),
                method: method.to_owned(),
                signature: signature.to_string(),
            })
    }

    fn expect_mode(&self, method: &str, signature: &Signature, requested: InvocationMode) -> RpcResult<()> {
        let handler = self.handler(method, signature)?;
        match handler.kind {
            HandlerKind::Fire(declared) if declared != requested => Err(RpcError::ModeMismatch {
                method: method.to_owned(),
                declared,
                requested,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("contract", &self.contract_name())
            .field("depth", &self.inner.base.as_ref().map_or(0, RpcChain::len))
            .field("ctor_args", &self.inner.ctor_args.len())
            .finish()
    }
}

fn adapt<T: DeserializeOwned>(method: &str, value: Value) -> RpcResult<T> {
    serde_json::from_value(value).map_err(|err| RpcError::Adaptation {
        method: method.to_owned(),
        expected: std::any::type_name::<T>(),
        detail: err.to_string(),
    })
}

fn unexpected_outcome(method: &str, outcome: &Outcome) -> RpcError {
    RpcError::Adaptation {
        method: method.to_owned(),
        expected: "declared return shape",
        detail: format!("operation produced {outcome:?}"),
    }
}
