use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::descriptor::Signature;
use crate::error::{RpcError, RpcResult};
use crate::introspect::{ClassContract, InvocationMode, MethodContract};

use super::argument::Arg;
use super::codec::Serializer;
use super::rpc::Rpc;

/// 针对一个目标契约构建调用的发送器。
///
/// # 教案式说明
/// - **意图 (Why)**：把“方法名 + 签名 + 实参”转换为 [`Rpc`]，并在构建时发现契约违约；
/// - **契约 (What)**：
///   - 契约中不存在的操作返回 [`RpcError::UnknownOperation`]，不做任何模糊匹配；
///   - 超时取契约级超时，其次为配置的默认超时；
///   - 单向操作构建的调用 `expects_result == false`；
/// - **实现 (How)**：构建时为 `(name, signature)` 建立索引，查找为常数时间；克隆只增加引用计数。
#[derive(Clone)]
pub struct RpcSender {
    inner: Arc<SenderInner>,
}

struct SenderInner {
    contract: Arc<ClassContract>,
    contract_name: Arc<str>,
    serializer: Arc<dyn Serializer>,
    default_timeout: Option<Duration>,
    index: HashMap<(String, Signature), usize>,
}

impl RpcSender {
    pub fn new(
        contract: Arc<ClassContract>,
        serializer: Arc<dyn Serializer>,
        default_timeout: Option<Duration>,
    ) -> Self {
        let index = contract
            .methods()
            .iter()
            .enumerate()
            .map(|(position, method)| ((method.name().to_owned(), method.signature().clone()), position))
            .collect();
        Self {
            inner: Arc::new(SenderInner {
                contract_name: Arc::from(contract.name()),
                contract,
                serializer,
                default_timeout,
                index,
            }),
        }
    }

    pub fn contract(&self) -> &Arc<ClassContract> {
        &self.inner.contract
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.inner.serializer
    }

    /// 本发送器构建的调用使用的超时。
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.contract.timeout().or(self.inner.default_timeout)
    }

    /// 以相同契约与超时、不同编解码器派生新发送器。
    pub fn with_serializer(&self, serializer: Arc<dyn Serializer>) -> RpcSender {
        RpcSender::new(
            Arc::clone(&self.inner.contract),
            serializer,
            self.inner.default_timeout,
        )
    }

    /// 查找操作契约。
    pub fn method(&self, name: &str, signature: &Signature) -> Option<&MethodContract> {
        self.inner
            .index
            .get(&(name.to_owned(), signature.clone()))
            .map(|position| &self.inner.contract.methods()[*position])
    }

    /// 构建一次调用。
    pub fn build_invocation(&self, method: &str, signature: &Signature, args: Vec<Arg>) -> RpcResult<Rpc> {
        let contract = self
            .method(method, signature)
            .ok_or_else(|| RpcError::UnknownOperation {
                contract: self.inner.contract_name.to_string(),
                method: method.to_owned(),
                signature: signature.to_string(),
            })?;
        self.build(contract, args)
    }

    /// 按名称构建调用；仅适用于没有重载的操作。
    pub fn invoke_unique(&self, method: &str, args: Vec<Arg>) -> RpcResult<Rpc> {
        let mut candidates = self.inner.contract.methods_named(method);
        let contract = candidates.next().ok_or_else(|| RpcError::UnknownOperation {
            contract: self.inner.contract_name.to_string(),
            method: method.to_owned(),
            signature: "(..)".to_owned(),
        })?;
        if candidates.next().is_some() {
            return Err(RpcError::AmbiguousOperation {
                contract: self.inner.contract_name.to_string(),
                method: method.to_owned(),
            });
        }
        self.build(contract, args)
    }

    /// 实参个数必须与声明一致；链式映射按下标读取实参。
    fn build(&self, contract: &MethodContract, args: Vec<Arg>) -> RpcResult<Rpc> {
        if args.len() != contract.params().len() {
            return Err(RpcError::ArgumentCount {
                expected: contract.params().len(),
                actual: args.len(),
            });
        }
        Ok(Rpc::new(
            Arc::clone(&self.inner.contract_name),
            Arc::from(contract.name()),
            contract.signature().clone(),
            args,
            contract.mode() != InvocationMode::FireAndForget,
            self.timeout(),
            Arc::clone(&self.inner.serializer),
        ))
    }

    pub fn ptr_eq(&self, other: &RpcSender) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RpcSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcSender")
            .field("contract", &self.inner.contract_name)
            .field("operations", &self.inner.index.len())
            .field("serializer", &self.inner.serializer.name())
            .field("timeout", &self.timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::descriptor::{ContractDescriptor, ContractKind, MethodDescriptor, ReturnDesc, TypeDesc};
    use crate::introspect::{IntrospectOptions, introspect};
    use crate::invocation::JsonSerializer;

    fn sender(timeout: Option<Duration>) -> RpcSender {
        let descriptor = ContractDescriptor::builder("fleet::GroupProvider", ContractKind::Trait)
            .method(
                MethodDescriptor::new("group")
                    .param::<String>()
                    .returns(ReturnDesc::value::<String>()),
            )
            .method(
                MethodDescriptor::new("group")
                    .param::<u32>()
                    .returns(ReturnDesc::value::<String>()),
            )
            .method(MethodDescriptor::new("reload").ignore_result())
            .build();
        let contract = introspect(&descriptor, &IntrospectOptions::new()).expect("introspection");
        RpcSender::new(Arc::new(contract), Arc::new(JsonSerializer), timeout)
    }

    #[test]
    fn unknown_operation_fails_fast() {
        let err = sender(None)
            .build_invocation("missing", &Signature::of(&[], &TypeDesc::unit()), Vec::new())
            .unwrap_err();
        assert!(matches!(err, RpcError::UnknownOperation { ref method, .. } if method == "missing"));
    }

    #[test]
    fn overloaded_name_requires_signature() {
        let sender = sender(None);
        assert!(matches!(
            sender.invoke_unique("group", vec![Arg::new(1_u32)]),
            Err(RpcError::AmbiguousOperation { .. })
        ));
        let rpc = sender.invoke_unique("reload", Vec::new()).expect("unique operation");
        assert!(!rpc.expects_result(), "单向操作不应等待结果");
    }

    #[test]
    fn default_timeout_applies_without_contract_timeout() {
        let sender = sender(Some(Duration::from_millis(750)));
        let signature = Signature::of(&[TypeDesc::of::<u32>()], &TypeDesc::of::<String>());
        let rpc = sender
            .build_invocation("group", &signature, vec![Arg::new(3_u32)])
            .expect("known operation");
        assert_eq!(rpc.timeout(), Some(Duration::from_millis(750)));
        assert_eq!(rpc.contract(), "fleet::GroupProvider");
        assert_eq!(rpc.args().len(), 1);
    }

    #[test]
    fn argument_count_must_match_declaration() {
        let signature = Signature::of(&[TypeDesc::of::<u32>()], &TypeDesc::of::<String>());
        assert!(matches!(
            sender(None).build_invocation("group", &signature, Vec::new()),
            Err(RpcError::ArgumentCount {
                expected: 1,
                actual: 0
            })
        ));
    }
}
