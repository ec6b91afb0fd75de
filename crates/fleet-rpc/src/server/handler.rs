use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::descriptor::Signature;
use crate::error::codes;

/// 处理器的执行结果。
pub enum Handled {
    /// 终端调用的返回值。
    Value(Value),
    /// 链式调用产出的下一个处理对象。
    Object(Arc<dyn RpcHandler>),
    /// 无返回值。
    Unit,
}

impl Handled {
    /// 序列化任意返回值。
    pub fn value<T: Serialize>(value: &T) -> Result<Self, HandlerFailure> {
        serde_json::to_value(value)
            .map(Handled::Value)
            .map_err(|err| HandlerFailure::new(codes::HANDLER_FAILURE, err.to_string()))
    }
}

impl fmt::Debug for Handled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handled::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Handled::Object(_) => f.write_str("Object"),
            Handled::Unit => f.write_str("Unit"),
        }
    }
}

/// 处理器失败，原样回传给调用方的 [`RpcError::Remote`](crate::RpcError::Remote)。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct HandlerFailure {
    pub code: String,
    pub message: String,
}

impl HandlerFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unknown_operation(method: &str, signature: &Signature) -> Self {
        Self::new(
            codes::UNKNOWN_OPERATION,
            format!("no handler for `{method}{signature}`"),
        )
    }
}

/// 接收端的调用处理器。
///
/// 链式请求的每一帧都在上一帧返回的 [`Handled::Object`] 上执行，根帧在注册的处理器上执行。
pub trait RpcHandler: Send + Sync + 'static {
    fn handle(&self, method: &str, signature: &Signature, args: &[Value]) -> Result<Handled, HandlerFailure>;
}

/// 按位置解码实参。
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, HandlerFailure> {
    let value = args.get(index).ok_or_else(|| {
        HandlerFailure::new(
            codes::INVALID_ARGUMENT,
            format!("missing argument {index}, got {}", args.len()),
        )
    })?;
    serde_json::from_value(value.clone()).map_err(|err| {
        HandlerFailure::new(
            codes::INVALID_ARGUMENT,
            format!("argument {index}: {err}"),
        )
    })
}

type MethodFn = dyn Fn(&[Value]) -> Result<Handled, HandlerFailure> + Send + Sync;

/// 以闭包组装的处理器。
///
/// 先按 `(name, signature)` 精确匹配，找不到时退回按名称注册的处理函数。
pub struct MethodTable {
    contract: String,
    exact: HashMap<(String, Signature), Box<MethodFn>>,
    by_name: HashMap<String, Box<MethodFn>>,
}

impl MethodTable {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            exact: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// 注册一个精确签名的处理函数。
    pub fn on<F>(mut self, name: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Handled, HandlerFailure> + Send + Sync + 'static,
    {
        self.exact.insert((name.into(), signature), Box::new(handler));
        self
    }

    /// 注册一个匹配该名称所有签名的处理函数。
    pub fn on_any<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Handled, HandlerFailure> + Send + Sync + 'static,
    {
        self.by_name.insert(name.into(), Box::new(handler));
        self
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn into_handler(self) -> Arc<dyn RpcHandler> {
        Arc::new(self)
    }
}

impl RpcHandler for MethodTable {
    fn handle(&self, method: &str, signature: &Signature, args: &[Value]) -> Result<Handled, HandlerFailure> {
        let handler = self
            .exact
            .get(&(method.to_owned(), signature.clone()))
            .or_else(|| self.by_name.get(method))
            .ok_or_else(|| HandlerFailure::unknown_operation(method, signature))?;
        handler(args)
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("contract", &self.contract)
            .field("exact", &self.exact.len())
            .field("by_name", &self.by_name.len())
            .finish()
    }
}
