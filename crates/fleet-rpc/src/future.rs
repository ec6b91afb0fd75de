use futures::future::BoxFuture;

use crate::error::RpcResult;

/// `RpcFuture` 是异步调用模式统一返回的 Future 包装。
///
/// # 设计背景（Why）
/// - 合成出的实现需要在对象安全的调度表里存放异步结果，统一为装箱 Future；
/// - 约束为 `Send + 'static`，允许调用方把 Future 交给任意多线程执行器。
///
/// # 契约说明（What）
/// - Future 在关联响应到达（或通道报告失败/超时）时完成；
/// - 创建 Future 本身不会阻塞调用线程。
pub type RpcFuture<T> = BoxFuture<'static, RpcResult<T>>;
