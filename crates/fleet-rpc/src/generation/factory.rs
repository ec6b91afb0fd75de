use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::descriptor::TypeDesc;
use crate::error::{GenerationError, RpcError, RpcResult};
use crate::invocation::{Arg, ChannelSupplier, RpcChain, RpcSender};

use super::flags::GenerationFlags;
use super::object::RemoteObject;
use super::synthesis::Implementation;

/// 构造参数中的占位值，分配实例时被替换为具体对象。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialArg {
    /// 目标对象所用的发送器。
    Sender,
    /// 新对象的链基（可能为空）。
    ChainBase,
    /// 新对象的通道供应器。
    ChannelSupplier,
}

impl SpecialArg {
    /// 解析负数映射编码：`-1` 发送器、`-2` 链基、`-3` 通道供应器。
    pub fn from_mapping_index(index: i32) -> Result<Self, GenerationError> {
        match index {
            -1 => Ok(SpecialArg::Sender),
            -2 => Ok(SpecialArg::ChainBase),
            -3 => Ok(SpecialArg::ChannelSupplier),
            _ => Err(GenerationError::SpecialArgIndex { index }),
        }
    }

    pub fn mapping_index(self) -> i32 {
        match self {
            SpecialArg::Sender => -1,
            SpecialArg::ChainBase => -2,
            SpecialArg::ChannelSupplier => -3,
        }
    }

    /// 注入值的固定类型。
    pub fn type_desc(self) -> TypeDesc {
        match self {
            SpecialArg::Sender => TypeDesc::of::<RpcSender>(),
            SpecialArg::ChainBase => TypeDesc::of::<Option<RpcChain>>(),
            SpecialArg::ChannelSupplier => TypeDesc::of::<ChannelSupplier>(),
        }
    }
}

/// 转发给合成对象的“用户构造参数”。
#[derive(Clone, Debug)]
pub enum ConstructorArg {
    Value(Arg),
    /// 待替换的占位值。
    Special(SpecialArg),
    Sender(RpcSender),
    Chain(Option<RpcChain>),
    Channel(ChannelSupplier),
}

impl ConstructorArg {
    pub fn value<T>(value: T) -> Self
    where
        T: Serialize + Any + Send + Sync,
    {
        ConstructorArg::Value(Arg::new(value))
    }

    /// 以原始类型读取普通参数。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            ConstructorArg::Value(arg) => arg.downcast_ref(),
            _ => None,
        }
    }

    pub fn as_sender(&self) -> Option<&RpcSender> {
        match self {
            ConstructorArg::Sender(sender) => Some(sender),
            _ => None,
        }
    }

    pub fn as_chain(&self) -> Option<Option<&RpcChain>> {
        match self {
            ConstructorArg::Chain(chain) => Some(chain.as_ref()),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&ChannelSupplier> {
        match self {
            ConstructorArg::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    fn replace_special(
        self,
        sender: &RpcSender,
        base: Option<&RpcChain>,
        channel: &ChannelSupplier,
    ) -> ConstructorArg {
        match self {
            ConstructorArg::Special(SpecialArg::Sender) => ConstructorArg::Sender(sender.clone()),
            ConstructorArg::Special(SpecialArg::ChainBase) => ConstructorArg::Chain(base.cloned()),
            ConstructorArg::Special(SpecialArg::ChannelSupplier) => {
                ConstructorArg::Channel(channel.clone())
            }
            other => other,
        }
    }
}

impl From<Arg> for ConstructorArg {
    fn from(arg: Arg) -> Self {
        ConstructorArg::Value(arg)
    }
}

impl From<SpecialArg> for ConstructorArg {
    fn from(arg: SpecialArg) -> Self {
        ConstructorArg::Special(arg)
    }
}

pub(crate) type AllocationNotifier = Arc<dyn Fn() + Send + Sync>;

/// 合成完成的工厂。
pub(crate) struct FinishedFactory {
    implementation: Arc<Implementation>,
    sender: RpcSender,
    notifier: AllocationNotifier,
}

impl FinishedFactory {
    pub(crate) fn new(
        implementation: Arc<Implementation>,
        sender: RpcSender,
        notifier: AllocationNotifier,
    ) -> Self {
        Self {
            implementation,
            sender,
            notifier,
        }
    }

    fn construct(
        &self,
        sender: RpcSender,
        base: Option<RpcChain>,
        channel: ChannelSupplier,
        extra_args: Vec<ConstructorArg>,
    ) -> RpcResult<RemoteObject> {
        let expected = self.implementation.user_arg_count();
        if extra_args.len() != expected {
            return Err(RpcError::ArgumentCount {
                expected,
                actual: extra_args.len(),
            });
        }

        (self.notifier)();

        let ctor_args = extra_args
            .into_iter()
            .map(|arg| arg.replace_special(&sender, base.as_ref(), &channel))
            .collect();
        Ok(RemoteObject::new(
            Arc::clone(&self.implementation),
            sender,
            channel,
            base,
            ctor_args,
        ))
    }
}

/// 占位单元：先发布、后解析。
struct FactoryCell {
    contract: String,
    flags: GenerationFlags,
    resolved: OnceLock<Result<Arc<FinishedFactory>, GenerationError>>,
    lock: Mutex<()>,
    ready: Condvar,
}

/// 某个 `(契约, 生成标志)` 的实例工厂句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：互相引用的契约在合成时需要拿到彼此的工厂；句柄在合成开始前就发布，
///   第二次查找拿到的是尚未完成的同一句柄，而不是再次递归合成；
/// - **契约 (What)**：
///   - 句柄解析且只解析一次，结果为完成的工厂或合成失败；
///   - 在未解析的句柄上构造实例会阻塞等待解析，失败时返回同一份 [`GenerationError`]，不会永久挂起；
///   - 克隆共享同一个单元，[`InstanceFactory::ptr_eq`] 判断是否为同一句柄；
/// - **实现 (How)**：`OnceLock` 保存结果，已解析时读取无锁；等待路径使用 `parking_lot` 的
///   `Mutex` 与 `Condvar`。
#[derive(Clone)]
pub struct InstanceFactory {
    cell: Arc<FactoryCell>,
}

impl InstanceFactory {
    pub(crate) fn placeholder(contract: impl Into<String>, flags: GenerationFlags) -> Self {
        Self {
            cell: Arc::new(FactoryCell {
                contract: contract.into(),
                flags,
                resolved: OnceLock::new(),
                lock: Mutex::new(()),
                ready: Condvar::new(),
            }),
        }
    }

    pub(crate) fn resolve(&self, result: Result<Arc<FinishedFactory>, GenerationError>) {
        let _guard = self.cell.lock.lock();
        let _ = self.cell.resolved.set(result);
        self.cell.ready.notify_all();
    }

    fn wait(&self) -> Result<Arc<FinishedFactory>, GenerationError> {
        if let Some(result) = self.cell.resolved.get() {
            return result.clone();
        }
        let mut guard = self.cell.lock.lock();
        loop {
            if let Some(result) = self.cell.resolved.get() {
                return result.clone();
            }
            self.cell.ready.wait(&mut guard);
        }
    }

    /// 工厂所属的契约名称。
    pub fn contract_name(&self) -> &str {
        &self.cell.contract
    }

    pub fn flags(&self) -> GenerationFlags {
        self.cell.flags
    }

    /// 合成是否已经结束（无论成败）。
    pub fn is_resolved(&self) -> bool {
        self.cell.resolved.get().is_some()
    }

    /// 合成失败时返回失败原因；未解析或成功时返回 `None`。
    pub fn failure(&self) -> Option<GenerationError> {
        match self.cell.resolved.get() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// 完成的合成实现；等待解析。
    pub fn implementation(&self) -> Result<Arc<Implementation>, GenerationError> {
        self.wait().map(|finished| Arc::clone(&finished.implementation))
    }

    /// 工厂为其目标契约持有的发送器；等待解析。
    pub fn sender(&self) -> Result<RpcSender, GenerationError> {
        self.wait().map(|finished| finished.sender.clone())
    }

    /// 分配一个新的合成对象。
    ///
    /// - `extra_args` 的个数必须等于契约声明的用户构造参数个数，否则返回
    ///   [`RpcError::ArgumentCount`]，不截断也不补齐；
    /// - 其中的 [`SpecialArg`] 占位值被替换为工厂的发送器、`base_chain` 与 `channel`；
    /// - 每次成功分配都会通知分配计数（同时刷新缓存条目的空闲时钟）。
    pub fn construct_instance(
        &self,
        base_chain: Option<RpcChain>,
        channel: ChannelSupplier,
        extra_args: Vec<ConstructorArg>,
    ) -> RpcResult<RemoteObject> {
        let finished = self.wait()?;
        finished.construct(finished.sender.clone(), base_chain, channel, extra_args)
    }

    /// 以调用方提供的发送器分配实例，供构建器覆盖编解码器或排除操作使用。
    pub(crate) fn construct_with_sender(
        &self,
        sender: RpcSender,
        base_chain: Option<RpcChain>,
        channel: ChannelSupplier,
        extra_args: Vec<ConstructorArg>,
    ) -> RpcResult<RemoteObject> {
        let finished = self.wait()?;
        finished.construct(sender, base_chain, channel, extra_args)
    }

    pub fn ptr_eq(&self, other: &InstanceFactory) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for InstanceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.cell.resolved.get() {
            None => "pending",
            Some(Ok(_)) => "ready",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("InstanceFactory")
            .field("contract", &self.cell.contract)
            .field("flags", &self.cell.flags)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn special_arg_indices_roundtrip() {
        for special in [SpecialArg::Sender, SpecialArg::ChainBase, SpecialArg::ChannelSupplier] {
            assert_eq!(SpecialArg::from_mapping_index(special.mapping_index()).unwrap(), special);
        }
        assert_eq!(
            SpecialArg::from_mapping_index(-4).unwrap_err(),
            GenerationError::SpecialArgIndex { index: -4 }
        );
    }

    #[test]
    fn waiter_observes_failure_instead_of_hanging() {
        let factory = InstanceFactory::placeholder("fleet::Broken", GenerationFlags::empty());
        let waiter = {
            let factory = factory.clone();
            thread::spawn(move || factory.implementation().err())
        };
        thread::sleep(Duration::from_millis(20));
        factory.resolve(Err(GenerationError::MissingConstructor {
            contract: "fleet::Broken".to_owned(),
        }));
        let observed = waiter.join().expect("waiter thread");
        assert_eq!(
            observed,
            Some(GenerationError::MissingConstructor {
                contract: "fleet::Broken".to_owned()
            })
        );
        assert!(factory.is_resolved());
        assert!(factory.failure().is_some());
    }
}
