use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{MappingSource, Signature, TypeDesc};
use crate::error::GenerationError;
use crate::introspect::{ChainMetadata, ClassContract, InvocationMode, MethodContract};

use super::cache::GenerationCache;
use super::factory::InstanceFactory;
use super::flags::GenerationFlags;

/// 单个操作的合成结果。
pub(crate) enum HandlerKind {
    /// 直接按调用模式发送。
    Fire(InvocationMode),
    /// 组合调用链并分配目标对象。
    Chain(ChainPlan),
}

/// 链式操作在合成期确定的计划。
pub(crate) struct ChainPlan {
    pub(crate) factory: InstanceFactory,
    /// 按目标构造参数位置排列的来源。
    pub(crate) sources: Vec<MappingSource>,
}

pub(crate) struct MethodHandler {
    pub(crate) method: MethodContract,
    pub(crate) kind: HandlerKind,
}

/// 为一个目标契约合成的调度表。
///
/// # 教案式说明
/// - **意图 (Why)**：Rust 无法在运行期创建类型，合成的产物是一张“操作 → 处理方式”的表，
///   由通用的 [`RemoteObject`](super::RemoteObject) 查表执行；
/// - **契约 (What)**：每个 [`MethodContract`] 恰有一个处理项；链式操作的参数映射与目标工厂
///   在此一次性校验并解析，调用期不再重复；
/// - **风险 (Trade-offs)**：嵌套工厂可能仍是占位句柄（互相引用的契约），直到第一次链式调用才等待其解析。
pub struct Implementation {
    contract: Arc<ClassContract>,
    flags: GenerationFlags,
    handlers: Vec<MethodHandler>,
    index: HashMap<(String, Signature), usize>,
}

impl Implementation {
    pub fn contract(&self) -> &Arc<ClassContract> {
        &self.contract
    }

    pub fn contract_name(&self) -> &str {
        self.contract.name()
    }

    pub fn flags(&self) -> GenerationFlags {
        self.flags
    }

    /// 实现的操作个数。
    pub fn operation_count(&self) -> usize {
        self.handlers.len()
    }

    /// 缓存的操作签名，按操作顺序排列。
    pub fn signatures(&self) -> impl Iterator<Item = (&str, &Signature)> {
        self.handlers
            .iter()
            .map(|handler| (handler.method.name(), handler.method.signature()))
    }

    /// 嵌套的实例工厂（链式返回）。
    pub fn nested_factories(&self) -> impl Iterator<Item = &InstanceFactory> {
        self.handlers.iter().filter_map(|handler| match &handler.kind {
            HandlerKind::Chain(plan) => Some(&plan.factory),
            HandlerKind::Fire(_) => None,
        })
    }

    /// 分配实例时调用方必须提供的额外构造参数个数。
    pub fn user_arg_count(&self) -> usize {
        self.contract.user_constructor_params().len()
    }

    pub(crate) fn handler(&self, name: &str, signature: &Signature) -> Option<&MethodHandler> {
        self.index
            .get(&(name.to_owned(), signature.clone()))
            .map(|position| &self.handlers[*position])
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("contract", &self.contract.name())
            .field("flags", &self.flags)
            .field("operations", &self.handlers.len())
            .finish()
    }
}

/// 为 `contract` 合成调度表。
///
/// 链式操作的目标工厂从 `cache` 获取；目标若正在合成，拿到的是占位句柄。
pub(crate) fn synthesize(
    contract: Arc<ClassContract>,
    flags: GenerationFlags,
    cache: &GenerationCache,
) -> Result<Implementation, GenerationError> {
    let mut handlers = Vec::with_capacity(contract.methods().len());

    // 内省已按生成标志过滤具体方法，这里逐一合成。
    for method in contract.methods() {
        let kind = match method.chain() {
            Some(chain) => HandlerKind::Chain(plan_chain(&contract, method, chain, cache)?),
            None => HandlerKind::Fire(method.mode()),
        };
        handlers.push(MethodHandler {
            method: method.clone(),
            kind,
        });
    }

    let index = handlers
        .iter()
        .enumerate()
        .map(|(position, handler)| {
            (
                (handler.method.name().to_owned(), handler.method.signature().clone()),
                position,
            )
        })
        .collect();

    debug!(
        contract = contract.name(),
        ?flags,
        operations = handlers.len(),
        "synthesized implementation"
    );

    Ok(Implementation {
        contract,
        flags,
        handlers,
        index,
    })
}

/// 校验链式映射并解析目标工厂。
fn plan_chain(
    contract: &ClassContract,
    method: &MethodContract,
    chain: &ChainMetadata,
    cache: &GenerationCache,
) -> Result<ChainPlan, GenerationError> {
    let target = cache.class_contract(&chain.target(), chain.flags())?;
    let ctor_params = target.user_constructor_params();
    let mappings = chain.mappings();

    if mappings.len() != ctor_params.len() {
        return Err(GenerationError::ChainArityMismatch {
            contract: contract.name().to_owned(),
            method: method.name().to_owned(),
            target: chain.target_name().to_owned(),
            expected: ctor_params.len(),
            actual: mappings.len(),
        });
    }

    let mut sources: Vec<Option<MappingSource>> = vec![None; ctor_params.len()];
    for mapping in mappings {
        let slot = sources
            .get_mut(mapping.target)
            .filter(|slot| slot.is_none())
            .ok_or_else(|| GenerationError::ChainConstructorIndex {
                contract: contract.name().to_owned(),
                method: method.name().to_owned(),
                target: chain.target_name().to_owned(),
                index: mapping.target,
            })?;

        let source_type: TypeDesc = match mapping.source {
            MappingSource::Argument(index) => method
                .params()
                .get(index)
                .cloned()
                .ok_or_else(|| GenerationError::ChainArgumentOutOfRange {
                    contract: contract.name().to_owned(),
                    method: method.name().to_owned(),
                    index,
                    available: method.params().len(),
                })?,
            MappingSource::Special(special) => special.type_desc(),
        };

        let expected = &ctor_params[mapping.target];
        if !expected.accepts(&source_type) {
            return Err(GenerationError::ChainTypeMismatch {
                contract: contract.name().to_owned(),
                method: method.name().to_owned(),
                target: chain.target_name().to_owned(),
                index: mapping.target,
                expected: expected.to_string(),
                actual: source_type.to_string(),
            });
        }
        *slot = Some(mapping.source);
    }

    let factory = cache.get_or_generate(&target, chain.flags())?;
    Ok(ChainPlan {
        factory,
        sources: sources.into_iter().flatten().collect(),
    })
}
