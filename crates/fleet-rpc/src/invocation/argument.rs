use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::descriptor::TypeDesc;
use crate::error::CodecError;

/// 可以作为远程调用实参的值。
///
/// 实参以原始类型保存，直到发送时才交给序列化器转换为线上表示；
/// 链式调用中被映射为构造参数的实参因此可以按原类型转交给下一个对象。
pub trait RpcArgument: Any + Send + Sync {
    /// 转换为线上的动态值。
    fn marshal(&self) -> Result<Value, CodecError>;

    fn as_any(&self) -> &dyn Any;

    /// 实参的类型描述符。
    fn type_desc(&self) -> TypeDesc;
}

impl<T> RpcArgument for T
where
    T: Serialize + Any + Send + Sync,
{
    fn marshal(&self) -> Result<Value, CodecError> {
        serde_json::to_value(self).map_err(|err| CodecError::json("marshal argument", &err))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_desc(&self) -> TypeDesc {
        TypeDesc::of::<T>()
    }
}

/// 共享的调用实参，克隆只增加引用计数。
#[derive(Clone)]
pub struct Arg(Arc<dyn RpcArgument>);

impl Arg {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Any + Send + Sync,
    {
        Self(Arc::new(value))
    }

    /// 以原始类型读取实参。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn marshal(&self) -> Result<Value, CodecError> {
        self.0.marshal()
    }

    pub fn type_desc(&self) -> TypeDesc {
        self.0.type_desc()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arg<{}>", self.0.type_desc())
    }
}
