//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义远程契约合成引擎对外暴露的错误语义：契约违约、合成失败、远程调用失败、
//!   结果适配失败与实例分配参数错误；
//! - 每个错误都携带稳定错误码（见 [`codes`]），便于在链路日志中检索与聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型均派生 `thiserror::Error`，可直接参与 `?` 传播；
//! - [`GenerationError`] 必须可克隆：同一个占位工厂上的所有等待者都需要观察到同一份失败；
//! - 本层不做任何自动重试，错误分类仅供调用方决策。

use std::time::Duration;

use thiserror::Error;

use crate::introspect::InvocationMode;

/// 稳定错误码集合，遵循 `<领域>.<语义>` 命名约定。
pub mod codes {
    /// 向发送器请求了契约中不存在的操作。
    pub const UNKNOWN_OPERATION: &str = "rpc.unknown_operation";
    /// 按名称解析操作时命中多个重载。
    pub const AMBIGUOUS_OPERATION: &str = "rpc.ambiguous_operation";
    /// 实现合成失败。
    pub const GENERATION: &str = "rpc.generation";
    /// 传输层失败（断连、超时、I/O）。
    pub const TRANSPORT: &str = "rpc.transport";
    /// 远端执行失败并回传了错误描述。
    pub const REMOTE: &str = "rpc.remote";
    /// 解码结果与声明的返回类型不兼容。
    pub const ADAPTATION: &str = "rpc.adaptation";
    /// 实参或额外构造参数的数量与声明不符。
    pub const ARGUMENT_COUNT: &str = "rpc.argument_count";
    /// 序列化或反序列化失败。
    pub const CODEC: &str = "rpc.codec";
    /// 调用方式与方法声明的调用模式不一致。
    pub const MODE_MISMATCH: &str = "rpc.mode_mismatch";
    /// 链式调用产出的对象不是期望的契约。
    pub const CONTRACT_MISMATCH: &str = "rpc.contract_mismatch";
    /// 修改构造参数时下标越界。
    pub const CONSTRUCTOR_ARG_INDEX: &str = "rpc.constructor_arg_index";
    /// 接收端没有注册请求的根契约。
    pub const UNKNOWN_TARGET: &str = "rpc.unknown_target";
    /// 链式回放时中间帧没有产出对象。
    pub const BROKEN_CHAIN: &str = "rpc.broken_chain";
    /// 接收端无法把实参解码为声明的参数类型。
    pub const INVALID_ARGUMENT: &str = "rpc.invalid_argument";
    /// 接收端处理器执行失败。
    pub const HANDLER_FAILURE: &str = "rpc.handler_failure";
}

/// 合成阶段的致命错误。
///
/// # 教案式说明
/// - **意图 (Why)**：契约结构问题（缺少构造入口、链式参数映射非法等）只能在合成时发现，
///   一旦出现即中止本次合成，不会在调用期重复校验；
/// - **契约 (What)**：全部字段为拥有型字符串，满足 `Clone + Send + Sync + 'static`，
///   以便占位单元把同一份失败广播给所有持有者；
/// - **风险 (Trade-offs)**：字段以人类可读字符串保存，放弃了结构化匹配的部分能力，换取诊断信息完整。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// 目标契约被声明为不可远程化。
    #[error("contract `{contract}` cannot be used with rpc: {reason}")]
    IllegalTarget { contract: String, reason: String },

    /// 抽象操作被跳过后契约将无法完整实现。
    #[error(
        "abstract operation `{method}{signature}` declared in `{contract}` is static, final or ignored and can never be implemented"
    )]
    UnimplementableOperation {
        contract: String,
        method: String,
        signature: String,
    },

    /// 既没有标记为 RPC 入口的构造器，也没有无参构造器。
    #[error("no rpc construction point found in `{contract}`")]
    MissingConstructor { contract: String },

    /// 构造器参数个数与映射条目个数不一致。
    #[error(
        "chain arity mismatch: construction point of `{target}` for `{method}` in `{contract}` takes {expected} parameters, but {actual} mappings were declared"
    )]
    ChainArityMismatch {
        contract: String,
        method: String,
        target: String,
        expected: usize,
        actual: usize,
    },

    /// 映射指向了构造器上不存在的参数位置，或多个映射指向同一位置。
    #[error(
        "method `{method}` in `{contract}` maps to constructor parameter {index} of `{target}` which is out of range or already mapped"
    )]
    ChainConstructorIndex {
        contract: String,
        method: String,
        target: String,
        index: usize,
    },

    /// 映射引用了方法上不存在的实参位置。
    #[error(
        "method `{method}` in `{contract}` maps argument {index}, but the method only declares {available} parameters"
    )]
    ChainArgumentOutOfRange {
        contract: String,
        method: String,
        index: usize,
        available: usize,
    },

    /// 构造器参数类型无法接收映射来源的类型。
    #[error(
        "chain type mismatch: construction point of `{target}` expects `{expected}` at index {index}, but `{method}` in `{contract}` maps `{actual}`"
    )]
    ChainTypeMismatch {
        contract: String,
        method: String,
        target: String,
        index: usize,
        expected: String,
        actual: String,
    },

    /// 原始负数编码的特殊参数索引越界。
    #[error("illegal special argument mapping index {index}")]
    SpecialArgIndex { index: i32 },

    /// 构建器在生成实现前没有配置通道供应器。
    #[error("no channel supplier configured for `{contract}`")]
    MissingChannel { contract: String },

    /// 合成线程在发布结果前异常退出（例如 panic）。
    #[error("synthesis of `{contract}` was abandoned before completion")]
    Abandoned { contract: String },
}

/// 传输层失败，由 [`Channel`](crate::invocation::Channel) 实现者产出。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// 通道已断开。
    #[error("channel to `{peer}` is disconnected")]
    Disconnected { peer: String },
    /// 在通道自身的超时时间内未收到关联响应。
    #[error("no response within {after:?}")]
    Timeout { after: Duration },
    /// 通道供应器当前无法提供可用通道。
    #[error("no channel available: {detail}")]
    Unavailable { detail: String },
    /// 其他 I/O 失败。
    #[error("transport i/o failure: {detail}")]
    Io { detail: String },
}

/// 编解码失败。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{context}: {detail}")]
pub struct CodecError {
    context: &'static str,
    detail: String,
}

impl CodecError {
    /// 以上下文标签与描述构造错误。
    pub fn new(context: &'static str, detail: impl Into<String>) -> Self {
        Self {
            context,
            detail: detail.into(),
        }
    }

    /// 从 `serde_json` 错误转换，保留原始描述。
    pub fn json(context: &'static str, err: &serde_json::Error) -> Self {
        Self::new(context, err.to_string())
    }

    /// 失败发生的环节，例如 `"encode request"`。
    pub fn context(&self) -> &'static str {
        self.context
    }
}

/// 引擎统一错误。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方只面对一个错误类型，通过 [`RpcError::code`] 区分类别；
/// - **契约 (What)**：`Generation`/`Transport`/`Codec` 通过 `From` 自动转换，生成代码可直接 `?`；
/// - **风险 (Trade-offs)**：`Remote` 变体只保留远端给出的错误码与描述，不尝试重建远端错误类型。
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unknown operation `{method}{signature}` requested from sender of `{contract}`")]
    UnknownOperation {
        contract: String,
        method: String,
        signature: String,
    },

    #[error("operation name `{method}` is overloaded in `{contract}`; a signature is required")]
    AmbiguousOperation { contract: String, method: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("remote invocation failed with `{code}`: {message}")]
    Remote { code: String, message: String },

    #[error("result of `{method}` is not a valid `{expected}`: {detail}")]
    Adaptation {
        method: String,
        expected: &'static str,
        detail: String,
    },

    #[error("illegal argument count, expected {expected}, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("constructor argument index {index} is out of range for {len} arguments")]
    ConstructorArgIndex { index: usize, len: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("operation `{method}` is declared as {declared:?} but was invoked as {requested:?}")]
    ModeMismatch {
        method: String,
        declared: InvocationMode,
        requested: InvocationMode,
    },

    #[error("operation `{method}` produced `{actual}` where `{expected}` was expected")]
    ContractMismatch {
        method: String,
        expected: String,
        actual: String,
    },
}

impl RpcError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::UnknownOperation { .. } => codes::UNKNOWN_OPERATION,
            RpcError::AmbiguousOperation { .. } => codes::AMBIGUOUS_OPERATION,
            RpcError::Generation(_) => codes::GENERATION,
            RpcError::Transport(_) => codes::TRANSPORT,
            RpcError::Remote { .. } => codes::REMOTE,
            RpcError::Adaptation { .. } => codes::ADAPTATION,
            RpcError::ArgumentCount { .. } => codes::ARGUMENT_COUNT,
            RpcError::ConstructorArgIndex { .. } => codes::CONSTRUCTOR_ARG_INDEX,
            RpcError::Codec(_) => codes::CODEC,
            RpcError::ModeMismatch { .. } => codes::MODE_MISMATCH,
            RpcError::ContractMismatch { .. } => codes::CONTRACT_MISMATCH,
        }
    }

    /// 是否为远程调用阶段的失败（传输或远端执行）。
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Remote { .. })
    }
}

/// 引擎统一结果别名。
pub type RpcResult<T> = Result<T, RpcError>;
