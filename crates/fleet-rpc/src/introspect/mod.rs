//! 契约内省：把契约描述表展开为去重、定序、已确定调用模式的操作集合。

mod introspector;
mod metadata;

pub use introspector::{IntrospectOptions, introspect};
pub use metadata::{ChainMetadata, ClassContract, InvocationMode, MethodContract};
