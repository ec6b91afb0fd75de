//! 实现合成、生成缓存与实例分配。
//!
//! 内省得到的 [`ClassContract`](crate::introspect::ClassContract) 在这里被合成为调度表
//! [`Implementation`]，由 [`GenerationCache`] 按 `(契约, 生成标志)` 复用；
//! [`InstanceFactory`] 从调度表分配 [`RemoteObject`]。

mod builder;
mod cache;
mod factory;
mod flags;
mod object;
mod synthesis;

pub use builder::{ImplementationBuilder, InstanceAllocator, RpcFactory};
pub use cache::{CacheKey, CacheStats, GenerationCache, GenerationCacheBuilder, GenerationObserver};
pub use factory::{ConstructorArg, InstanceFactory, SpecialArg};
pub use flags::GenerationFlags;
pub use object::{Outcome, RemoteContract, RemoteObject};
pub use synthesis::Implementation;
