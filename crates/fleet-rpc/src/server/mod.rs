//! 接收端：按根契约注册处理器，解码请求并回放调用链。
//!
//! 生成的远程对象只负责把调用编码为帧序列；本模块是对端的最小实现，
//! 供进程内回环 [`LocalChannel`] 与集成测试使用。

mod dispatcher;
mod handler;
mod local;
mod registry;

pub use dispatcher::RpcDispatcher;
pub use handler::{Handled, HandlerFailure, MethodTable, RpcHandler, arg};
pub use local::LocalChannel;
pub use registry::HandlerRegistry;
