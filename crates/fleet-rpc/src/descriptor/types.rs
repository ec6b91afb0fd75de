use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// 契约中出现的类型标识。
///
/// # 教案式说明
/// - **意图 (Why)**：合成阶段需要比较“构造器参数能否接收映射来源”，以及为每个操作计算稳定的
///   类型签名；Rust 没有运行期类型描述，因此以名称标识类型；
/// - **契约 (What)**：两个描述符名称相同即视为同一类型；[`TypeDesc::any`] 是顶层类型，
///   可以接收任何来源；
/// - **实现 (How)**：[`TypeDesc::of`] 使用 `std::any::type_name`，同一编译产物内结果稳定；
///   契约名称等非 Rust 类型通过 [`TypeDesc::named`] 声明。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDesc(Cow<'static, str>);

impl TypeDesc {
    /// 取 Rust 类型的描述符。
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// 以静态名称声明描述符。
    pub const fn named(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// 以运行期字符串声明描述符。
    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// 顶层类型：动态 JSON 值。
    pub fn any() -> Self {
        Self::of::<serde_json::Value>()
    }

    /// 单元类型 `()`。
    pub fn unit() -> Self {
        Self::of::<()>()
    }

    /// 描述符名称。
    pub fn name(&self) -> &str {
        &self.0
    }

    /// `self` 作为目标位置时能否接收 `source` 类型的值。
    pub fn accepts(&self, source: &TypeDesc) -> bool {
        self == source || *self == Self::any()
    }
}

impl fmt::Debug for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDesc({})", self.0)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 操作的类型签名，形如 `(alloc::string::String,i32)->bool`。
///
/// 签名与方法名共同唯一标识一个操作；内部以 `Arc<str>` 保存，克隆开销固定。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Arc<str>);

impl Signature {
    /// 由参数类型与返回类型描述符拼接签名。
    pub fn of(params: &[TypeDesc], returns: &TypeDesc) -> Self {
        let mut descriptor = String::from("(");
        for (index, param) in params.iter().enumerate() {
            if index > 0 {
                descriptor.push(',');
            }
            descriptor.push_str(param.name());
        }
        descriptor.push_str(")->");
        descriptor.push_str(returns.name());
        Self(Arc::from(descriptor))
    }

    /// 直接包装已有的签名字符串（例如从线上帧中读取）。
    pub fn from_descriptor(descriptor: impl AsRef<str>) -> Self {
        Self(Arc::from(descriptor.as_ref()))
    }

    /// 签名字符串。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.0)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
