use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::descriptor::{
    ContractDescriptor, ContractRef, MethodDescriptor, ParamMapping, ReturnDesc, Signature,
    TypeDesc,
};
use crate::generation::GenerationFlags;

/// 操作的调用模式，在合成阶段一次性确定。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvocationMode {
    /// 阻塞调用线程直至关联响应、失败或通道超时。
    Sync,
    /// 立即返回 Future，响应到达时完成。
    Async,
    /// 单向发送，没有完成信号。
    FireAndForget,
}

impl InvocationMode {
    /// 由返回形态推导调用模式。
    ///
    /// - 标记忽略结果的操作总是单向发送；
    /// - Future 返回值使用异步模式；
    /// - 其余（含无返回值与链式返回）使用同步模式，链式返回实际上从不直接发送。
    pub fn infer(returns: &ReturnDesc, ignore_result: bool) -> Self {
        if ignore_result && !returns.is_contract() {
            return InvocationMode::FireAndForget;
        }
        match returns {
            ReturnDesc::Future(_) => InvocationMode::Async,
            _ => InvocationMode::Sync,
        }
    }
}

impl fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvocationMode::Sync => "sync",
            InvocationMode::Async => "async",
            InvocationMode::FireAndForget => "fire-and-forget",
        })
    }
}

/// 链式返回的合成元数据。
#[derive(Clone)]
pub struct ChainMetadata {
    target_name: String,
    target: ContractRef,
    mappings: Vec<ParamMapping>,
    flags: GenerationFlags,
}

impl ChainMetadata {
    pub(crate) fn new(
        target_name: impl Into<String>,
        target: ContractRef,
        mappings: Vec<ParamMapping>,
        flags: GenerationFlags,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            target,
            mappings,
            flags,
        }
    }

    /// 用于合成链式对象的目标契约名称。
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// 解析目标契约描述表。
    pub fn target(&self) -> Arc<ContractDescriptor> {
        (self.target)()
    }

    pub fn mappings(&self) -> &[ParamMapping] {
        &self.mappings
    }

    pub fn flags(&self) -> GenerationFlags {
        self.flags
    }
}

impl fmt::Debug for ChainMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainMetadata")
            .field("target", &self.target_name)
            .field("mappings", &self.mappings)
            .field("flags", &self.flags)
            .finish()
    }
}

/// 内省得到的单个操作契约，构建后不可变。
#[derive(Clone, Debug)]
pub struct MethodContract {
    name: String,
    params: Vec<TypeDesc>,
    returns: ReturnDesc,
    signature: Signature,
    mode: InvocationMode,
    chain: Option<ChainMetadata>,
    concrete: bool,
    declared_in: String,
}

impl MethodContract {
    pub(crate) fn from_descriptor(
        method: &MethodDescriptor,
        signature: Signature,
        declared_in: &str,
    ) -> Self {
        let modifiers = method.modifiers();
        let returns = method.return_desc().clone();
        let chain = match &returns {
            ReturnDesc::Contract { name, contract } => {
                let declared = method.chain();
                let (target_name, target) = declared
                    .base_implementation()
                    .map(|(name, contract)| (name.to_owned(), contract))
                    .unwrap_or_else(|| (name.clone().into_owned(), *contract));
                Some(ChainMetadata::new(
                    target_name,
                    target,
                    declared.mappings().to_vec(),
                    declared.flags(),
                ))
            }
            _ => None,
        };

        Self {
            name: method.name().to_owned(),
            params: method.params().to_vec(),
            mode: InvocationMode::infer(&returns, modifiers.ignore_result),
            returns,
            signature,
            chain,
            concrete: modifiers.concrete,
            declared_in: declared_in.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    pub fn returns(&self) -> &ReturnDesc {
        &self.returns
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    pub fn chain(&self) -> Option<&ChainMetadata> {
        self.chain.as_ref()
    }

    /// 契约自身是否已提供实现。
    pub fn is_concrete(&self) -> bool {
        self.concrete
    }

    /// 声明该操作的契约名称（最近的那一个）。
    pub fn declared_in(&self) -> &str {
        &self.declared_in
    }

    /// `(name, signature)` 是否匹配本操作。
    pub fn matches(&self, name: &str, signature: &Signature) -> bool {
        self.name == name && &self.signature == signature
    }
}

/// 一个目标契约的完整远程化视图。
///
/// # 教案式说明
/// - **意图 (Why)**：内省结果被发送器、合成器与生成缓存共享，每个目标只构建一次；
/// - **契约 (What)**：`methods` 已去重且顺序确定（自身声明优先，随后按祖先声明顺序深度优先）；
///   `user_constructor_params` 是分配实例时调用方必须提供的额外构造参数类型；
/// - **风险 (Trade-offs)**：[`ClassContract::exclude`] 返回新视图而非原地修改，
///   已发布给缓存的视图永远不会被改变。
#[derive(Clone, Debug)]
pub struct ClassContract {
    target: Arc<ContractDescriptor>,
    extending: Option<Arc<ContractDescriptor>>,
    interfaces: Vec<Arc<ContractDescriptor>>,
    methods: Vec<MethodContract>,
    timeout: Option<Duration>,
    user_ctor_params: Vec<TypeDesc>,
}

impl ClassContract {
    pub(crate) fn new(
        target: Arc<ContractDescriptor>,
        extending: Option<Arc<ContractDescriptor>>,
        interfaces: Vec<Arc<ContractDescriptor>>,
        methods: Vec<MethodContract>,
        timeout: Option<Duration>,
        user_ctor_params: Vec<TypeDesc>,
    ) -> Self {
        Self {
            target,
            extending,
            interfaces,
            methods,
            timeout,
            user_ctor_params,
        }
    }

    /// 目标契约名称。
    pub fn name(&self) -> &str {
        self.target.name()
    }

    pub fn target(&self) -> &Arc<ContractDescriptor> {
        &self.target
    }

    /// 生成缓存使用的名称：以外部抽象基扩展时附带基的名称，避免与直接合成的结果混用。
    pub fn generation_key(&self) -> String {
        match &self.extending {
            Some(base) if base.name() != self.target.name() => {
                format!("{}+{}", self.target.name(), base.name())
            }
            _ => self.target.name().to_owned(),
        }
    }

    /// 本视图的对象能否作为 `name` 契约使用：目标自身、扩展的抽象基，或它们的任一祖先。
    ///
    /// 链式返回声明了更具体的实现契约时，合成出的对象以实现契约命名，
    /// 但仍需被当作声明的返回契约接收。
    pub fn conforms_to(&self, name: &str) -> bool {
        let mut visited = HashSet::new();
        let mut pending: Vec<Arc<ContractDescriptor>> = vec![Arc::clone(&self.target)];
        pending.extend(self.extending.iter().cloned());
        while let Some(contract) = pending.pop() {
            if contract.name() == name {
                return true;
            }
            if visited.insert(contract.name().to_owned()) {
                pending.extend(contract.parents().iter().map(|parent| parent()));
            }
        }
        false
    }

    /// 提供构造入口的抽象基（若有）。
    pub fn extending(&self) -> Option<&Arc<ContractDescriptor>> {
        self.extending.as_ref()
    }

    /// 目标直接声明的接口祖先。
    pub fn interfaces(&self) -> &[Arc<ContractDescriptor>] {
        &self.interfaces
    }

    pub fn methods(&self) -> &[MethodContract] {
        &self.methods
    }

    /// 按名称与签名查找操作。
    pub fn method(&self, name: &str, signature: &Signature) -> Option<&MethodContract> {
        self.methods.iter().find(|m| m.matches(name, signature))
    }

    /// 同名的全部重载。
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodContract> + 'a {
        self.methods.iter().filter(move |m| m.name() == name)
    }

    /// 契约级默认超时。
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user_constructor_params(&self) -> &[TypeDesc] {
        &self.user_ctor_params
    }

    /// 返回去掉指定操作后的新视图。
    pub fn exclude(&self, name: &str, signature: &Signature) -> ClassContract {
        let mut narrowed = self.clone();
        narrowed.methods.retain(|m| !m.matches(name, signature));
        narrowed
    }
}
