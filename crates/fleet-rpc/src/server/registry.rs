use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::handler::RpcHandler;

/// 契约名称到根处理器的注册表。
///
/// # 教案式注释
/// - **意图 (Why)**：接收端按请求中的根契约名称选择处理器，注册与查找可能来自不同线程；
/// - **契约 (What)**：同名重复注册时后者覆盖前者并返回被替换的处理器；
/// - **风险 (Trade-offs)**：`DashMap` 分片锁在查找时只短暂持有，返回的是克隆出的 `Arc`，不持有 guard。
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<Arc<str>, Arc<dyn RpcHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, contract: &str, handler: Arc<dyn RpcHandler>) -> Option<Arc<dyn RpcHandler>> {
        self.handlers.insert(Arc::from(contract), handler)
    }

    pub fn unregister(&self, contract: &str) -> Option<Arc<dyn RpcHandler>> {
        self.handlers.remove(contract).map(|(_, handler)| handler)
    }

    pub fn get(&self, contract: &str) -> Option<Arc<dyn RpcHandler>> {
        self.handlers
            .get(contract)
            .map(|handler| Arc::clone(handler.value()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
