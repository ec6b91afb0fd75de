use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{ContractDescriptor, ContractKind, ContractRef, Signature};
use crate::error::GenerationError;

use super::metadata::{ClassContract, MethodContract};

/// 内省选项。
#[derive(Clone, Debug, Default)]
pub struct IntrospectOptions {
    implement_concrete_methods: bool,
    excluded: BTreeSet<(String, Signature)>,
    extending: Option<ContractRef>,
}

impl IntrospectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 契约自身已实现的操作是否也改为远程转发。
    pub fn implement_concrete_methods(mut self, enabled: bool) -> Self {
        self.implement_concrete_methods = enabled;
        self
    }

    /// 排除一个 `(name, signature)` 操作。
    pub fn exclude(mut self, name: impl Into<String>, signature: Signature) -> Self {
        self.excluded.insert((name.into(), signature));
        self
    }

    /// 以指定抽象基提供构造入口。
    pub fn extending(mut self, base: ContractRef) -> Self {
        self.extending = Some(base);
        self
    }

    pub fn implements_concrete(&self) -> bool {
        self.implement_concrete_methods
    }

    fn is_excluded(&self, name: &str, signature: &Signature) -> bool {
        self.excluded
            .iter()
            .any(|(excluded, sig)| excluded == name && sig == signature)
    }
}

/// 从契约描述表构建 [`ClassContract`]。
///
/// # 教案式说明
/// - **意图 (Why)**：调用模式、参数映射与构造入口都在此一次性确定，调用期不再反查描述表；
/// - **契约 (What)**：
///   - 先遍历目标自身声明，再按声明顺序深度优先遍历祖先，已访问的契约不再重复；
///   - `(name, signature)` 冲突时最近的声明胜出，即便它被跳过也会遮蔽更远的声明；
///   - 跳过 static、final、显式忽略、被排除以及未请求实现的具体操作；
///   - 抽象操作若被标记为 static/final/忽略，合成结果永远不完整，立即返回
///     [`GenerationError::UnimplementableOperation`]；
///   - 不可远程化的契约返回 [`GenerationError::IllegalTarget`]；
/// - **风险 (Trade-offs)**：输出顺序只依赖描述表的声明顺序，不做排序，以保持与源声明一致。
pub fn introspect(
    contract: &Arc<ContractDescriptor>,
    options: &IntrospectOptions,
) -> Result<ClassContract, GenerationError> {
    if let Some(reason) = contract.non_remotable_reason() {
        return Err(GenerationError::IllegalTarget {
            contract: contract.name().to_owned(),
            reason: reason.to_owned(),
        });
    }

    let extending = match options.extending {
        Some(base) => Some(base()),
        None if contract.kind() == ContractKind::AbstractBase => Some(Arc::clone(contract)),
        None => None,
    };

    let mut walk = Walk {
        options,
        visited: HashSet::new(),
        seen: HashSet::new(),
        methods: Vec::new(),
    };
    walk.visit(contract)?;
    if let Some(base) = &extending {
        walk.visit(base)?;
    }

    let user_ctor_params = match &extending {
        Some(base) if base.kind() == ContractKind::AbstractBase => {
            base.construction_point()?.params().to_vec()
        }
        _ => Vec::new(),
    };

    let interfaces = contract
        .parents()
        .iter()
        .map(|parent| parent())
        .filter(|parent| parent.kind() == ContractKind::Trait)
        .collect();

    let timeout = contract
        .timeout()
        .or_else(|| extending.as_ref().and_then(|base| base.timeout()));

    debug!(
        contract = contract.name(),
        methods = walk.methods.len(),
        ctor_params = user_ctor_params.len(),
        "introspected contract"
    );

    Ok(ClassContract::new(
        Arc::clone(contract),
        extending,
        interfaces,
        walk.methods,
        timeout,
        user_ctor_params,
    ))
}

struct Walk<'a> {
    options: &'a IntrospectOptions,
    visited: HashSet<String>,
    seen: HashSet<(String, Signature)>,
    methods: Vec<MethodContract>,
}

impl Walk<'_> {
    fn visit(&mut self, contract: &Arc<ContractDescriptor>) -> Result<(), GenerationError> {
        if !self.visited.insert(contract.name().to_owned()) {
            return Ok(());
        }

        for method in contract.methods() {
            let signature = method.signature();
            if !self.seen.insert((method.name().to_owned(), signature.clone())) {
                continue;
            }

            let modifiers = method.modifiers();
            if modifiers.is_static || modifiers.is_final || modifiers.skipped {
                if !modifiers.concrete {
                    return Err(GenerationError::UnimplementableOperation {
                        contract: contract.name().to_owned(),
                        method: method.name().to_owned(),
                        signature: signature.to_string(),
                    });
                }
                continue;
            }
            if self.options.is_excluded(method.name(), &signature) {
                continue;
            }
            if modifiers.concrete && !self.options.implement_concrete_methods {
                continue;
            }

            self.methods
                .push(MethodContract::from_descriptor(method, signature, contract.name()));
        }

        for parent in contract.parents() {
            self.visit(&parent())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::descriptor::{ConstructorDescriptor, MethodDescriptor, ReturnDesc, TypeDesc};
    use crate::introspect::InvocationMode;

    fn named() -> Arc<ContractDescriptor> {
        ContractDescriptor::builder("fleet::Named", ContractKind::Trait)
            .method(MethodDescriptor::new("name").returns(ReturnDesc::value::<String>()))
            .method(
                MethodDescriptor::new("display")
                    .returns(ReturnDesc::value::<String>())
                    .concrete(),
            )
            .build()
    }

    fn provider() -> Arc<ContractDescriptor> {
        ContractDescriptor::builder("fleet::ServiceProvider", ContractKind::Trait)
            .parent(named)
            .method(MethodDescriptor::new("name").returns(ReturnDesc::value::<String>()))
            .method(
                MethodDescriptor::new("count")
                    .param::<String>()
                    .returns(ReturnDesc::value::<u32>()),
            )
            .method(
                MethodDescriptor::new("count_async")
                    .param::<String>()
                    .returns(ReturnDesc::future::<u32>()),
            )
            .method(MethodDescriptor::new("refresh").ignore_result())
            .method(MethodDescriptor::new("local").concrete().skip())
            .timeout(Duration::from_secs(5))
            .build()
    }

    #[test]
    fn nearest_declaration_wins_and_order_is_stable() {
        let contract = introspect(&provider(), &IntrospectOptions::new()).expect("introspection");
        let names: Vec<_> = contract.methods().iter().map(|m| m.name()).collect();
        assert_eq!(names, ["name", "count", "count_async", "refresh"]);
        assert_eq!(contract.methods()[0].declared_in(), "fleet::ServiceProvider");
        assert_eq!(contract.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(contract.interfaces().len(), 1);
    }

    #[test]
    fn modes_follow_return_shape() {
        let contract = introspect(&provider(), &IntrospectOptions::new()).expect("introspection");
        let mode = |name: &str| contract.methods_named(name).next().map(|m| m.mode());
        assert_eq!(mode("count"), Some(InvocationMode::Sync));
        assert_eq!(mode("count_async"), Some(InvocationMode::Async));
        assert_eq!(mode("refresh"), Some(InvocationMode::FireAndForget));
    }

    #[test]
    fn concrete_methods_only_on_request() {
        let contract = introspect(
            &provider(),
            &IntrospectOptions::new().implement_concrete_methods(true),
        )
        .expect("introspection");
        assert!(contract.methods_named("display").next().is_some());
        assert!(contract.methods_named("local").next().is_none(), "忽略的方法不得出现");
    }

    #[test]
    fn excluded_method_is_dropped() {
        let signature = Signature::of(&[TypeDesc::of::<String>()], &TypeDesc::of::<u32>());
        let contract = introspect(
            &provider(),
            &IntrospectOptions::new().exclude("count", signature.clone()),
        )
        .expect("introspection");
        assert!(contract.method("count", &signature).is_none());
    }

    #[test]
    fn ignored_abstract_operation_is_fatal() {
        let broken = ContractDescriptor::builder("fleet::Broken", ContractKind::Trait)
            .method(MethodDescriptor::new("start").skip())
            .build();
        let err = introspect(&broken, &IntrospectOptions::new()).unwrap_err();
        assert!(matches!(err, GenerationError::UnimplementableOperation { .. }));
    }

    #[test]
    fn non_remotable_contract_is_rejected() {
        let hidden = ContractDescriptor::builder("fleet::Hidden", ContractKind::Trait)
            .non_remotable("local scope")
            .build();
        let err = introspect(&hidden, &IntrospectOptions::new()).unwrap_err();
        assert_eq!(
            err,
            GenerationError::IllegalTarget {
                contract: "fleet::Hidden".to_owned(),
                reason: "local scope".to_owned()
            }
        );
    }

    #[test]
    fn abstract_base_forwards_marked_constructor_params() {
        let base = ContractDescriptor::builder("fleet::ServiceInfo", ContractKind::AbstractBase)
            .constructor(ConstructorDescriptor::entry_point(vec![
                TypeDesc::of::<String>(),
                TypeDesc::of::<u16>(),
            ]))
            .build();
        let contract = introspect(&base, &IntrospectOptions::new()).expect("introspection");
        assert_eq!(
            contract.user_constructor_params(),
            &[TypeDesc::of::<String>(), TypeDesc::of::<u16>()]
        );
    }
}
