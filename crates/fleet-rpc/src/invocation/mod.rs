//! 调用的构建与发送。
//!
//! - [`RpcSender`] 把方法名、签名与实参转换为 [`Rpc`]；
//! - [`Rpc`] 与 [`RpcChain`] 绑定通道后成为 [`RpcExecutable`]，按调用模式发送；
//! - [`Serializer`] 与 [`Channel`] 是引擎消费的两个外部协作者。

mod argument;
mod chain;
mod channel;
mod codec;
mod executor;
mod rpc;
mod sender;

pub use argument::{Arg, RpcArgument};
pub use chain::RpcChain;
pub use channel::{Channel, ChannelSupplier, RequestEnvelope};
pub use codec::{InvocationFrame, JsonSerializer, Serializer, WireRequest, WireResponse};
pub use executor::{Invocation, RpcExecutable};
pub use rpc::Rpc;
pub use sender::RpcSender;
