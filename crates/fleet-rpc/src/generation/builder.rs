use std::fmt;
use std::sync::Arc;

use crate::config::RpcConfig;
use crate::descriptor::{ContractRef, Signature};
use crate::error::{GenerationError, RpcError, RpcResult};
use crate::introspect::{IntrospectOptions, introspect};
use crate::invocation::{Channel, ChannelSupplier, RpcChain, RpcSender, Serializer};

use super::cache::GenerationCache;
use super::factory::{ConstructorArg, InstanceFactory};
use super::flags::GenerationFlags;
use super::object::{RemoteContract, RemoteObject};

/// 引擎入口：持有配置与共享的生成缓存。
#[derive(Clone)]
pub struct RpcFactory {
    config: RpcConfig,
    cache: Arc<GenerationCache>,
}

impl RpcFactory {
    pub fn new(config: RpcConfig) -> Self {
        let cache = Arc::new(GenerationCache::new(&config));
        Self { config, cache }
    }

    /// 使用外部构造的缓存（例如注入了虚拟时钟）。
    pub fn with_cache(config: RpcConfig, cache: Arc<GenerationCache>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<GenerationCache> {
        &self.cache
    }

    /// 为强类型契约开始构建实现。
    pub fn implementation<C: RemoteContract>(&self) -> ImplementationBuilder {
        self.implementation_of(C::descriptor)
    }

    /// 为描述表开始构建实现。
    pub fn implementation_of(&self, contract: ContractRef) -> ImplementationBuilder {
        ImplementationBuilder {
            cache: Arc::clone(&self.cache),
            contract,
            channel: None,
            flags: self.config.default_generation_flags(),
            excluded: Vec::new(),
            serializer: None,
            extending: None,
        }
    }
}

impl fmt::Debug for RpcFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcFactory")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

/// 实现构建器。
///
/// # 契约说明（What）
/// - 必须配置通道（[`target_channel`](Self::target_channel) 或
///   [`channel_supplier`](Self::channel_supplier)），否则 [`generate`](Self::generate) 返回
///   [`GenerationError::MissingChannel`]；
/// - [`exclude_method`](Self::exclude_method) 只收窄分配出的对象所用的发送器：缓存中的实现仍按完整契约合成，
///   被排除的操作在调用时返回 [`RpcError::UnknownOperation`]；
/// - [`serializer`](Self::serializer) 同样只作用于本构建器分配的对象。
pub struct ImplementationBuilder {
    cache: Arc<GenerationCache>,
    contract: ContractRef,
    channel: Option<ChannelSupplier>,
    flags: GenerationFlags,
    excluded: Vec<(String, Signature)>,
    serializer: Option<Arc<dyn Serializer>>,
    extending: Option<ContractRef>,
}

impl ImplementationBuilder {
    /// 所有调用发往同一条通道。
    pub fn target_channel(self, channel: Arc<dyn Channel>) -> Self {
        self.channel_supplier(ChannelSupplier::fixed(channel))
    }

    /// 每次调用时解析通道。
    pub fn channel_supplier(mut self, supplier: ChannelSupplier) -> Self {
        self.channel = Some(supplier);
        self
    }

    pub fn implement_concrete_methods(mut self) -> Self {
        self.flags |= GenerationFlags::IMPLEMENT_CONCRETE;
        self
    }

    pub fn exclude_method(mut self, name: impl Into<String>, signature: Signature) -> Self {
        self.excluded.push((name.into(), signature));
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// 以指定抽象基提供构造入口。
    pub fn extending(mut self, base: ContractRef) -> Self {
        self.extending = Some(base);
        self
    }

    /// 合成（或复用）实现并返回分配器。
    pub fn generate(self) -> Result<InstanceAllocator, GenerationError> {
        let descriptor = (self.contract)();
        let channel = self.channel.ok_or_else(|| GenerationError::MissingChannel {
            contract: descriptor.name().to_owned(),
        })?;

        let full = match self.extending {
            None => self.cache.class_contract(&descriptor, self.flags)?,
            Some(base) => {
                let options = IntrospectOptions::new()
                    .implement_concrete_methods(self.flags.contains(GenerationFlags::IMPLEMENT_CONCRETE))
                    .extending(base);
                Arc::new(introspect(&descriptor, &options)?)
            }
        };
        let factory = self.cache.get_or_generate(&full, self.flags)?;

        let narrowed = self
            .excluded
            .iter()
            .fold((*full).clone(), |contract, (name, signature)| contract.exclude(name, signature));
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::clone(self.cache.serializer()));
        let sender = RpcSender::new(Arc::new(narrowed), serializer, self.cache.default_timeout());

        Ok(InstanceAllocator {
            factory,
            sender,
            channel,
            base: None,
            ctor_args: Vec::new(),
        })
    }
}

/// 不可变的实例分配器：每个修改方法都返回新分配器。
#[derive(Clone, Debug)]
pub struct InstanceAllocator {
    factory: InstanceFactory,
    sender: RpcSender,
    channel: ChannelSupplier,
    base: Option<RpcChain>,
    ctor_args: Vec<ConstructorArg>,
}

impl InstanceAllocator {
    pub fn factory(&self) -> &InstanceFactory {
        &self.factory
    }

    pub fn sender(&self) -> &RpcSender {
        &self.sender
    }

    pub fn constructor_args(&self) -> &[ConstructorArg] {
        &self.ctor_args
    }

    pub fn with_base_chain(&self, base: Option<RpcChain>) -> Self {
        Self {
            base,
            ..self.clone()
        }
    }

    pub fn with_channel_supplier(&self, channel: ChannelSupplier) -> Self {
        Self {
            channel,
            ..self.clone()
        }
    }

    /// 整体替换用户构造参数。
    pub fn with_constructor_args(&self, args: Vec<ConstructorArg>) -> Self {
        Self {
            ctor_args: args,
            ..self.clone()
        }
    }

    /// 替换第 `index` 个构造参数。
    pub fn change_constructor_arg(&self, index: usize, arg: ConstructorArg) -> RpcResult<Self> {
        let mut ctor_args = self.ctor_args.clone();
        let len = ctor_args.len();
        let slot = ctor_args
            .get_mut(index)
            .ok_or(RpcError::ConstructorArgIndex { index, len })?;
        *slot = arg;
        Ok(self.with_constructor_args(ctor_args))
    }

    /// 在 `index` 处插入构造参数，`index` 可以等于当前个数（即追加）。
    pub fn insert_constructor_args(&self, index: usize, args: Vec<ConstructorArg>) -> RpcResult<Self> {
        let len = self.ctor_args.len();
        if index > len {
            return Err(RpcError::ConstructorArgIndex { index, len });
        }
        if args.is_empty() {
            return Ok(self.clone());
        }
        let mut ctor_args = self.ctor_args.clone();
        ctor_args.splice(index..index, args);
        Ok(self.with_constructor_args(ctor_args))
    }

    pub fn append_constructor_args(&self, args: Vec<ConstructorArg>) -> Self {
        let mut ctor_args = self.ctor_args.clone();
        ctor_args.extend(args);
        self.with_constructor_args(ctor_args)
    }

    /// 分配一个新对象。
    pub fn allocate(&self) -> RpcResult<RemoteObject> {
        self.factory.construct_with_sender(
            self.sender.clone(),
            self.base.clone(),
            self.channel.clone(),
            self.ctor_args.clone(),
        )
    }

    /// 分配并包装为强类型代理。
    pub fn allocate_as<C: RemoteContract>(&self) -> RpcResult<C> {
        self.allocate()?.adopt("allocate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        ConstructorDescriptor, ContractDescriptor, ContractKind, MethodDescriptor, ReturnDesc, TypeDesc,
    };
    use crate::test_stubs::RecordingChannel;

    fn server_info() -> Arc<ContractDescriptor> {
        ContractDescriptor::builder("fleet::ServerInfo", ContractKind::AbstractBase)
            .constructor(ConstructorDescriptor::entry_point(vec![
                TypeDesc::of::<String>(),
                TypeDesc::of::<u16>(),
            ]))
            .method(MethodDescriptor::new("online").returns(ReturnDesc::value::<u32>()))
            .build()
    }

    fn allocator() -> InstanceAllocator {
        RpcFactory::new(RpcConfig::default())
            .implementation_of(server_info)
            .target_channel(Arc::new(RecordingChannel::new()))
            .generate()
            .expect("generation")
    }

    #[test]
    fn generate_requires_a_channel() {
        let err = RpcFactory::new(RpcConfig::default())
            .implementation_of(server_info)
            .generate()
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::MissingChannel {
                contract: "fleet::ServerInfo".to_owned()
            }
        );
    }

    #[test]
    fn allocator_edits_are_persistent() {
        let base = allocator();
        let edited = base
            .append_constructor_args(vec![ConstructorArg::value(25565_u16)])
            .insert_constructor_args(0, vec![ConstructorArg::value(String::from("Lobby-1"))])
            .expect("insert at start");
        assert!(base.constructor_args().is_empty(), "原分配器不得被修改");

        let object = edited.allocate().expect("allocation");
        assert_eq!(
            object.constructor_arg(0).and_then(|arg| arg.downcast_ref::<String>()).map(String::as_str),
            Some("Lobby-1")
        );
        assert_eq!(
            object.constructor_arg(1).and_then(|arg| arg.downcast_ref::<u16>()),
            Some(&25565)
        );

        let changed = edited
            .change_constructor_arg(1, ConstructorArg::value(25566_u16))
            .expect("index in range");
        assert_eq!(
            changed.constructor_args()[1].downcast_ref::<u16>(),
            Some(&25566)
        );
    }

    #[test]
    fn out_of_range_edits_are_rejected() {
        let base = allocator();
        assert!(matches!(
            base.change_constructor_arg(0, ConstructorArg::value(1_u16)),
            Err(RpcError::ConstructorArgIndex { index: 0, len: 0 })
        ));
        assert!(matches!(
            base.insert_constructor_args(2, vec![ConstructorArg::value(1_u16)]),
            Err(RpcError::ConstructorArgIndex { index: 2, len: 0 })
        ));
    }

    #[test]
    fn wrong_argument_count_fails_allocation() {
        let err = allocator()
            .with_constructor_args(vec![ConstructorArg::value(String::from("Lobby-1"))])
            .allocate()
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::ArgumentCount {
                expected: 2,
                actual: 1
            }
        ));

        let err = allocator()
            .with_constructor_args(vec![
                ConstructorArg::value(String::from("Lobby-1")),
                ConstructorArg::value(25565_u16),
                ConstructorArg::value(true),
            ])
            .allocate()
            .unwrap_err();
        assert!(
            matches!(
                err,
                RpcError::ArgumentCount {
                    expected: 2,
                    actual: 3
                }
            ),
            "多余的构造参数不得被截断"
        );
    }
}
