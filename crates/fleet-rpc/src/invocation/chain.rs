use std::fmt;
use std::sync::Arc;

use super::channel::Channel;
use super::executor::{Invocation, RpcExecutable};
use super::rpc::Rpc;

/// 不可变、只追加的调用链。
///
/// # 教案式说明
/// - **意图 (Why)**：链式对象图中每个对象都持有“从根到自己”的路径，并可能被多个线程同时
///   用作新调用的前缀；原地拼接会让兄弟对象互相污染；
/// - **契约 (What)**：[`RpcChain::join`] 返回新链，接收者永远不变；
///   迭代顺序为从根到末端；
/// - **实现 (How)**：以 `Arc` 链接的持久化单链表保存，`join` 只分配一个节点，前缀被所有分支共享。
#[derive(Clone)]
pub struct RpcChain {
    tail: Arc<Node>,
}

struct Node {
    rpc: Rpc,
    prev: Option<Arc<Node>>,
    len: usize,
}

#[allow(clippy::len_without_is_empty)]
impl RpcChain {
    /// 以单个调用作为根创建链。
    pub fn of(rpc: Rpc) -> Self {
        Self {
            tail: Arc::new(Node {
                rpc,
                prev: None,
                len: 1,
            }),
        }
    }

    /// 追加一个调用，返回新链。
    pub fn join(&self, rpc: Rpc) -> RpcChain {
        Self {
            tail: Arc::new(Node {
                rpc,
                prev: Some(Arc::clone(&self.tail)),
                len: self.tail.len + 1,
            }),
        }
    }

    /// 链上的调用个数，至少为 1。
    pub fn len(&self) -> usize {
        self.tail.len
    }

    pub fn root(&self) -> &Rpc {
        let mut node = &self.tail;
        while let Some(prev) = &node.prev {
            node = prev;
        }
        &node.rpc
    }

    /// 末端调用。
    pub fn last(&self) -> &Rpc {
        &self.tail.rpc
    }

    /// 从根到末端依次迭代。
    pub fn iter(&self) -> impl Iterator<Item = &Rpc> {
        let mut nodes = Vec::with_capacity(self.len());
        let mut cursor = Some(&self.tail);
        while let Some(node) = cursor {
            nodes.push(&node.rpc);
            cursor = node.prev.as_ref();
        }
        nodes.into_iter().rev()
    }

    /// 方法名路径。
    pub fn path(&self) -> Vec<&str> {
        self.iter().map(Rpc::method).collect()
    }

    pub fn target(&self, channel: Arc<dyn Channel>) -> RpcExecutable {
        Invocation::Chain(self.clone()).target(channel)
    }

    pub fn ptr_eq(&self, other: &RpcChain) -> bool {
        Arc::ptr_eq(&self.tail, &other.tail)
    }
}

impl fmt::Debug for RpcChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
