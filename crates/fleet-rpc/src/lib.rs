#![deny(unsafe_code)]
#![doc = "fleet-rpc: 面向服务器集群编排的远程契约合成引擎。"]
#![doc = ""]
#![doc = "== 组成 =="]
#![doc = "1. `descriptor`：契约描述表，声明操作、祖先、构造入口与链式映射；"]
#![doc = "2. `introspect`：把描述表展开为去重、定序、确定调用模式的操作集合；"]
#![doc = "3. `invocation`：调用的构建、链式组合、编码与按模式发送；"]
#![doc = "4. `generation`：实现合成、按 `(契约, 生成标志)` 复用的生成缓存与实例分配；"]
#![doc = "5. `server`：接收端的处理器注册表与调用链回放，以及进程内回环通道。"]
#![doc = ""]
#![doc = "== 使用方式 =="]
#![doc = "在 trait 上标注 `#[fleet_rpc::contract]` 生成描述表与远程代理，再通过"]
#![doc = "[`RpcFactory::implementation`] 绑定通道并分配实例。"]

extern crate self as fleet_rpc;

pub use fleet_rpc_macros::contract;

pub mod config;
pub mod descriptor;
pub mod error;
pub mod future;
pub mod generation;
pub mod introspect;
pub mod invocation;
pub mod server;
pub mod telemetry;
pub mod test_stubs;
pub mod time;

pub use config::{ConfigError, RpcConfig};
pub use error::{CodecError, GenerationError, RpcError, RpcResult, TransportError, codes};
pub use future::RpcFuture;
pub use generation::{
    ConstructorArg, GenerationCache, GenerationFlags, ImplementationBuilder, InstanceAllocator,
    InstanceFactory, RemoteContract, RemoteObject, RpcFactory, SpecialArg,
};
pub use introspect::InvocationMode;
pub use invocation::{Arg, Channel, ChannelSupplier, RpcChain, RpcSender};

/// 以任意可序列化值构造实参列表。
///
/// ```ignore
/// object.call::<String>("greet", &signature, fleet_rpc::args!["Ada".to_owned()])
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::new($value)),+]
    };
}
