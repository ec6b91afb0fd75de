use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GenerationError;
use crate::generation::{GenerationFlags, RemoteContract, SpecialArg};

use super::types::{Signature, TypeDesc};

/// 惰性解析的契约引用。
///
/// 契约之间允许互相引用（A 的链式返回 B，B 又返回 A），因此描述表中只保存函数指针，
/// 在内省或合成真正需要时才解析；任何一方都不必在构建自身描述符时先构建对方。
pub type ContractRef = fn() -> Arc<ContractDescriptor>;

/// 契约的声明形态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContractKind {
    /// 纯接口：没有构造器，没有状态。
    Trait,
    /// 抽象基：可以声明构造器，合成实例时需要转发“用户构造参数”。
    AbstractBase,
}

/// 构造器描述。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructorDescriptor {
    params: Vec<TypeDesc>,
    entry_point: bool,
}

impl ConstructorDescriptor {
    /// 普通构造器。
    pub fn new(params: Vec<TypeDesc>) -> Self {
        Self {
            params,
            entry_point: false,
        }
    }

    /// 被显式标记为 RPC 构造入口的构造器。
    pub fn entry_point(params: Vec<TypeDesc>) -> Self {
        Self {
            params,
            entry_point: true,
        }
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    pub fn is_entry_point(&self) -> bool {
        self.entry_point
    }
}

/// 合成实例时使用的构造入口。
#[derive(Clone, Copy, Debug)]
pub enum ConstructionPoint<'a> {
    /// 标记为 RPC 入口的构造器。
    Marked(&'a ConstructorDescriptor),
    /// 无参构造（显式声明或隐式存在）。
    NoArgs,
}

impl ConstructionPoint<'_> {
    /// 构造入口的参数类型。
    pub fn params(&self) -> &[TypeDesc] {
        match self {
            ConstructionPoint::Marked(constructor) => constructor.params(),
            ConstructionPoint::NoArgs => &[],
        }
    }

    pub fn is_marked(&self) -> bool {
        matches!(self, ConstructionPoint::Marked(_))
    }
}

/// 操作的返回形态，决定调用模式与结果适配方式。
#[derive(Clone)]
pub enum ReturnDesc {
    /// 无返回值。
    Unit,
    /// 同步返回一个值。
    Value(TypeDesc),
    /// 返回在响应到达时完成的 Future。
    Future(TypeDesc),
    /// 返回另一个由远端控制的契约，触发链式组合。
    Contract {
        name: Cow<'static, str>,
        contract: ContractRef,
    },
}

impl ReturnDesc {
    pub fn value<T: ?Sized>() -> Self {
        ReturnDesc::Value(TypeDesc::of::<T>())
    }

    pub fn future<T: ?Sized>() -> Self {
        ReturnDesc::Future(TypeDesc::of::<T>())
    }

    /// 返回类型是另一个远程契约。
    pub fn contract<C: RemoteContract>() -> Self {
        ReturnDesc::Contract {
            name: Cow::Borrowed(C::CONTRACT_NAME),
            contract: C::descriptor,
        }
    }

    /// 以名称与惰性引用声明契约返回值，用于手写描述表。
    pub fn contract_ref(name: &'static str, contract: ContractRef) -> Self {
        ReturnDesc::Contract {
            name: Cow::Borrowed(name),
            contract,
        }
    }

    /// 参与签名计算的返回类型描述符。
    pub fn signature_type(&self) -> TypeDesc {
        match self {
            ReturnDesc::Unit => TypeDesc::unit(),
            ReturnDesc::Value(ty) => ty.clone(),
            ReturnDesc::Future(ty) => TypeDesc::owned(format!("future<{ty}>")),
            ReturnDesc::Contract { name, .. } => TypeDesc::owned(name.clone().into_owned()),
        }
    }

    pub fn is_contract(&self) -> bool {
        matches!(self, ReturnDesc::Contract { .. })
    }
}

impl fmt::Debug for ReturnDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnDesc::Unit => f.write_str("Unit"),
            ReturnDesc::Value(ty) => f.debug_tuple("Value").field(ty).finish(),
            ReturnDesc::Future(ty) => f.debug_tuple("Future").field(ty).finish(),
            ReturnDesc::Contract { name, .. } => f.debug_tuple("Contract").field(name).finish(),
        }
    }
}

/// 链式映射的来源：当前方法的实参，或保留的特殊参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingSource {
    Argument(usize),
    Special(SpecialArg),
}

/// 一条 “来源 → 目标构造参数位置” 映射。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamMapping {
    pub source: MappingSource,
    pub target: usize,
}

impl ParamMapping {
    pub fn argument(index: usize, target: usize) -> Self {
        Self {
            source: MappingSource::Argument(index),
            target,
        }
    }

    pub fn special(arg: SpecialArg, target: usize) -> Self {
        Self {
            source: MappingSource::Special(arg),
            target,
        }
    }

    /// 解析整数编码：非负数为实参位置，`-1..=-3` 依次为发送器、链基、通道供应器。
    pub fn from_raw(source: i32, target: usize) -> Result<Self, GenerationError> {
        if source >= 0 {
            Ok(Self::argument(source as usize, target))
        } else {
            Ok(Self::special(SpecialArg::from_mapping_index(source)?, target))
        }
    }
}

/// 链式返回的附加声明。
#[derive(Clone, Debug, Default)]
pub struct ChainDescriptor {
    base_implementation: Option<(Cow<'static, str>, ContractRef)>,
    mappings: Vec<ParamMapping>,
    flags: GenerationFlags,
}

impl ChainDescriptor {
    /// 实际用于合成的目标契约（缺省为声明的返回契约）。
    pub fn base_implementation(&self) -> Option<(&str, ContractRef)> {
        self.base_implementation
            .as_ref()
            .map(|(name, contract)| (name.as_ref(), *contract))
    }

    pub fn mappings(&self) -> &[ParamMapping] {
        &self.mappings
    }

    pub fn flags(&self) -> GenerationFlags {
        self.flags
    }
}

/// 操作修饰位。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MethodModifiers {
    pub is_static: bool,
    pub is_final: bool,
    /// 契约自身已提供实现（trait 默认方法 / 基类具体方法）。
    pub concrete: bool,
    /// 显式排除出远程化（等价于忽略注解）。
    pub skipped: bool,
    /// 不等待结果，总是以单向方式发送。
    pub ignore_result: bool,
}

/// 契约来源中的一个操作声明。
#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    name: Cow<'static, str>,
    params: Vec<TypeDesc>,
    returns: ReturnDesc,
    modifiers: MethodModifiers,
    chain: ChainDescriptor,
}

impl MethodDescriptor {
    /// 以无参、无返回值的形态开始声明。
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnDesc::Unit,
            modifiers: MethodModifiers::default(),
            chain: ChainDescriptor::default(),
        }
    }

    pub fn param<T: ?Sized>(self) -> Self {
        self.param_desc(TypeDesc::of::<T>())
    }

    pub fn param_desc(mut self, ty: TypeDesc) -> Self {
        self.params.push(ty);
        self
    }

    pub fn returns(mut self, returns: ReturnDesc) -> Self {
        self.returns = returns;
        self
    }

    pub fn concrete(mut self) -> Self {
        self.modifiers.concrete = true;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    pub fn final_method(mut self) -> Self {
        self.modifiers.is_final = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.modifiers.skipped = true;
        self
    }

    pub fn ignore_result(mut self) -> Self {
        self.modifiers.ignore_result = true;
        self
    }

    /// 链式返回时改用更具体的实现契约合成目标对象。
    pub fn chain_base<C: RemoteContract>(mut self) -> Self {
        self.chain.base_implementation = Some((Cow::Borrowed(C::CONTRACT_NAME), C::descriptor));
        self
    }

    pub fn chain_base_ref(mut self, name: &'static str, contract: ContractRef) -> Self {
        self.chain.base_implementation = Some((Cow::Borrowed(name), contract));
        self
    }

    /// 把第 `index` 个实参映射到目标构造入口的第 `target` 个参数。
    pub fn map_argument(mut self, index: usize, target: usize) -> Self {
        self.chain.mappings.push(ParamMapping::argument(index, target));
        self
    }

    /// 把特殊参数映射到目标构造入口的第 `target` 个参数。
    pub fn map_special(mut self, arg: SpecialArg, target: usize) -> Self {
        self.chain.mappings.push(ParamMapping::special(arg, target));
        self
    }

    pub fn map(mut self, mapping: ParamMapping) -> Self {
        self.chain.mappings.push(mapping);
        self
    }

    pub fn chain_flags(mut self, flags: GenerationFlags) -> Self {
        self.chain.flags = flags;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    pub fn return_desc(&self) -> &ReturnDesc {
        &self.returns
    }

    pub fn modifiers(&self) -> MethodModifiers {
        self.modifiers
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// 操作签名。
    pub fn signature(&self) -> Signature {
        Signature::of(&self.params, &self.returns.signature_type())
    }
}

/// 契约来源：一个类型对外声明的全部操作、祖先与构造器。
///
/// # 教案式说明
/// - **意图 (Why)**：Rust 没有运行期反射，契约的“形状”由描述表提供；描述表可以手写，
///   也可以由 `#[fleet_rpc::contract]` 在编译期生成；
/// - **契约 (What)**：`methods` 保持声明顺序，`parents` 按声明顺序列出直接祖先；
///   名称在整个进程内唯一标识契约，生成缓存以它作为键；
/// - **风险 (Trade-offs)**：名称冲突不会被检测，调用方需保证命名空间化（宏使用 `module_path!`）。
#[derive(Debug)]
pub struct ContractDescriptor {
    name: Cow<'static, str>,
    kind: ContractKind,
    non_remotable: Option<String>,
    parents: Vec<ContractRef>,
    methods: Vec<MethodDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
    timeout: Option<Duration>,
}

impl ContractDescriptor {
    pub fn builder(name: impl Into<Cow<'static, str>>, kind: ContractKind) -> ContractDescriptorBuilder {
        ContractDescriptorBuilder {
            inner: ContractDescriptor {
                name: name.into(),
                kind,
                non_remotable: None,
                parents: Vec::new(),
                methods: Vec::new(),
                constructors: Vec::new(),
                timeout: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ContractKind {
        self.kind
    }

    /// 若契约不可远程化，返回原因。
    pub fn non_remotable_reason(&self) -> Option<&str> {
        self.non_remotable.as_deref()
    }

    pub fn parents(&self) -> &[ContractRef] {
        &self.parents
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    /// 契约级默认调用超时。
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// 解析合成实例使用的构造入口。
    ///
    /// 优先选择标记为 RPC 入口的构造器；否则退回无参构造器。纯接口与未声明任何构造器的
    /// 抽象基都隐式拥有无参构造；声明了构造器却都带参数且未标记时返回
    /// [`GenerationError::MissingConstructor`]。
    pub fn construction_point(&self) -> Result<ConstructionPoint<'_>, GenerationError> {
        if let Some(marked) = self.constructors.iter().find(|c| c.is_entry_point()) {
            return Ok(ConstructionPoint::Marked(marked));
        }
        if self.constructors.is_empty() || self.constructors.iter().any(|c| c.params().is_empty()) {
            return Ok(ConstructionPoint::NoArgs);
        }
        Err(GenerationError::MissingConstructor {
            contract: self.name().to_owned(),
        })
    }
}

/// [`ContractDescriptor`] 的构建器。
pub struct ContractDescriptorBuilder {
    inner: ContractDescriptor,
}

impl ContractDescriptorBuilder {
    pub fn parent(mut self, parent: ContractRef) -> Self {
        self.inner.parents.push(parent);
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.inner.methods.push(method);
        self
    }

    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.inner.constructors.push(constructor);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = Some(timeout);
        self
    }

    /// 标记契约不可远程化（例如仅在本地作用域内可见）。
    pub fn non_remotable(mut self, reason: impl Into<String>) -> Self {
        self.inner.non_remotable = Some(reason.into());
        self
    }

    pub fn build(self) -> Arc<ContractDescriptor> {
        Arc::new(self.inner)
    }
}
