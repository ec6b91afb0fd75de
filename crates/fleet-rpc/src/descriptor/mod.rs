//! 契约来源：以描述表表达一个类型对外声明的操作、祖先与构造器。
//!
//! 描述表是内省器唯一的输入；它可以手写（见各测试），也可以由
//! `#[fleet_rpc::contract]` 从 trait 定义生成。

mod contract;
mod types;

pub use contract::{
    ChainDescriptor, ConstructionPoint, ConstructorDescriptor, ContractDescriptor,
    ContractDescriptorBuilder, ContractKind, ContractRef, MappingSource, MethodDescriptor,
    MethodModifiers, ParamMapping, ReturnDesc,
};
pub use types::{Signature, TypeDesc};
