//! # GenerationCache：按需合成并复用实例工厂
//!
//! ## 核心意图（Why）
//! - 合成一个契约的调度表需要内省、校验链式映射并递归解析嵌套工厂，结果必须复用；
//! - 互相引用的契约（A 的链式返回 B，B 又返回 A）需要在不死锁的前提下完成合成。
//!
//! ## 行为契约（What）
//! - 以 `(契约名称, 生成标志)` 为键；同一键在一个缓存代际内恰好完成一次合成，
//!   所有并发查找拿到同一个 [`InstanceFactory`] 句柄；
//! - 查找与占位插入在同一把锁内完成，合成本身在锁外执行，不阻塞无关的查找；
//! - 合成失败时，占位句柄以失败解析（所有持有者都能观察到），同时移除条目，
//!   下一次查找重新合成；合成线程 panic 时由守卫以 [`GenerationError::Abandoned`] 做同样处理；
//! - 已解析的条目在空闲超过 `idle_timeout` 后过期；过期条目在下一次查找时被移除并重新合成一次。
//!
//! ## 风险提示（Trade-offs）
//! - 条目的空闲时钟在查找与分配时刷新；只持有句柄却长期不分配的调用方可能遇到过期，
//!   但已持有的句柄仍然可用，只是不再被缓存复用。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::descriptor::ContractDescriptor;
use crate::error::GenerationError;
use crate::introspect::{ClassContract, IntrospectOptions, introspect};
use crate::invocation::{JsonSerializer, RpcSender, Serializer};
use crate::time::{Clock, SystemClock};

use super::factory::{AllocationNotifier, FinishedFactory, InstanceFactory};
use super::flags::GenerationFlags;
use super::synthesis;

/// 缓存键。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub contract: String,
    pub flags: GenerationFlags,
}

impl CacheKey {
    pub fn new(contract: impl Into<String>, flags: GenerationFlags) -> Self {
        Self {
            contract: contract.into(),
            flags,
        }
    }
}

/// 缓存运行统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 成功完成的合成次数。
    pub syntheses: u64,
    /// 命中已有条目（含占位）的查找次数。
    pub hits: u64,
    /// 因过期被移除的条目数。
    pub evictions: u64,
    /// 从本缓存的工厂分配的实例数。
    pub allocations: u64,
    /// 失败的合成次数。
    pub failures: u64,
}

#[derive(Default)]
struct StatCounters {
    syntheses: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
    allocations: AtomicU64,
    failures: AtomicU64,
}

/// 合成过程的观测钩子，默认实现为空。
pub trait GenerationObserver: Send + Sync + 'static {
    /// 一次合成开始（占位已发布）。
    fn synthesis_started(&self, _key: &CacheKey) {}

    /// 一次合成结束。
    fn synthesis_finished(&self, _key: &CacheKey, _result: Result<(), &GenerationError>) {}
}

struct CacheEntry {
    factory: InstanceFactory,
    last_access: Arc<AtomicU64>,
}

/// 生成缓存。
///
/// # 教案式说明
/// - **意图 (Why)**：集中持有合成结果与合成所需的共享配置（编解码器、默认超时、时钟）；
/// - **契约 (What)**：见模块文档；所有方法均可在多线程中并发调用；
/// - **实现 (How)**：条目表由一把 `parking_lot::Mutex` 保护；空闲时钟以“相对缓存创建时刻的纳秒数”
///   存放在 `AtomicU64` 中，分配通知无需加锁即可刷新。
pub struct GenerationCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    contracts: Mutex<HashMap<CacheKey, Arc<ClassContract>>>,
    clock: Arc<dyn Clock>,
    origin: Instant,
    idle_timeout: Duration,
    serializer: Arc<dyn Serializer>,
    default_timeout: Option<Duration>,
    stats: Arc<StatCounters>,
    observer: Option<Arc<dyn GenerationObserver>>,
}

impl GenerationCache {
    /// 以配置创建缓存，使用系统时钟与 JSON 编解码器。
    pub fn new(config: &RpcConfig) -> Self {
        Self::builder()
            .idle_timeout(config.cache_idle_timeout())
            .default_timeout(config.default_timeout())
            .build()
    }

    pub fn builder() -> GenerationCacheBuilder {
        GenerationCacheBuilder::default()
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// 为目标契约创建使用本缓存默认配置的发送器。
    pub fn sender_for(&self, contract: Arc<ClassContract>) -> RpcSender {
        RpcSender::new(contract, Arc::clone(&self.serializer), self.default_timeout)
    }

    /// 内省契约描述表，结果按 `(名称, 生成标志)` 记忆。
    pub fn class_contract(
        &self,
        descriptor: &Arc<ContractDescriptor>,
        flags: GenerationFlags,
    ) -> Result<Arc<ClassContract>, GenerationError> {
        let key = CacheKey::new(descriptor.name(), flags);
        if let Some(contract) = self.contracts.lock().get(&key) {
            return Ok(Arc::clone(contract));
        }

        let options = IntrospectOptions::new()
            .implement_concrete_methods(flags.contains(GenerationFlags::IMPLEMENT_CONCRETE));
        let contract = Arc::new(introspect(descriptor, &options)?);
        Ok(Arc::clone(
            self.contracts.lock().entry(key).or_insert(contract),
        ))
    }

    /// 查找或合成 `contract` 在 `flags` 下的实例工厂。
    ///
    /// # 契约说明（What）
    /// - 条目存在（占位或完成）时立即返回，不等待合成结束；
    /// - 否则先在锁内发布占位，再在锁外合成，最后以结果解析占位；
    /// - 合成失败返回错误并移除条目；已拿到占位的其他调用方在构造实例时观察到同一错误。
    pub fn get_or_generate(
        &self,
        contract: &Arc<ClassContract>,
        flags: GenerationFlags,
    ) -> Result<InstanceFactory, GenerationError> {
        let key = CacheKey::new(contract.generation_key(), flags);
        let now = self.now_nanos();

        let (factory, last_access) = {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(&key) {
                if entry.factory.is_resolved() && self.is_expired(entry, now) {
                    entries.remove(&key);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(contract = %key.contract, flags = ?key.flags, "cache entry expired");
                } else {
                    entry.last_access.store(now, Ordering::Relaxed);
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.factory.clone());
                }
            }

            let factory = InstanceFactory::placeholder(key.contract.clone(), flags);
            let last_access = Arc::new(AtomicU64::new(now));
            entries.insert(
                key.clone(),
                CacheEntry {
                    factory: factory.clone(),
                    last_access: Arc::clone(&last_access),
                },
            );
            (factory, last_access)
        };

        if let Some(observer) = &self.observer {
            observer.synthesis_started(&key);
        }

        let mut guard = PendingGuard {
            cache: self,
            key: &key,
            factory: &factory,
            armed: true,
        };
        let result = synthesis::synthesize(Arc::clone(contract), flags, self);
        guard.armed = false;
        drop(guard);

        match result {
            Ok(implementation) => {
                let finished = FinishedFactory::new(
                    Arc::new(implementation),
                    self.sender_for(Arc::clone(contract)),
                    self.allocation_notifier(last_access),
                );
                factory.resolve(Ok(Arc::new(finished)));
                self.stats.syntheses.fetch_add(1, Ordering::Relaxed);
                if let Some(observer) = &self.observer {
                    observer.synthesis_finished(&key, Ok(()));
                }
                Ok(factory)
            }
            Err(err) => {
                self.fail(&key, &factory, err.clone());
                Err(err)
            }
        }
    }

    /// 移除所有已过期的完成条目，返回移除个数。
    pub fn evict_expired(&self) -> usize {
        let now = self.now_nanos();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !(entry.factory.is_resolved() && self.is_expired(entry, now)));
        let evicted = before - entries.len();
        if evicted > 0 {
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, "evicted expired cache entries");
        }
        evicted
    }

    /// 移除指定条目；已发出的句柄不受影响。
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// 清空条目与内省记忆。
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.contracts.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            syntheses: self.stats.syntheses.load(Ordering::Relaxed),
            hits: self.stats.hits.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            allocations: self.stats.allocations.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }

    fn fail(&self, key: &CacheKey, factory: &InstanceFactory, err: GenerationError) {
        warn!(contract = %key.contract, flags = ?key.flags, error = %err, "synthesis failed");
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        if let Some(observer) = &self.observer {
            observer.synthesis_finished(key, Err(&err));
        }
        factory.resolve(Err(err));

        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .is_some_and(|entry| entry.factory.ptr_eq(factory))
        {
            entries.remove(key);
        }
    }

    fn allocation_notifier(&self, last_access: Arc<AtomicU64>) -> AllocationNotifier {
        let clock = Arc::clone(&self.clock);
        let origin = self.origin;
        let stats = Arc::clone(&self.stats);
        Arc::new(move || {
            last_access.store(nanos_since(origin, clock.now()), Ordering::Relaxed);
            stats.allocations.fetch_add(1, Ordering::Relaxed);
        })
    }

    fn now_nanos(&self) -> u64 {
        nanos_since(self.origin, self.clock.now())
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        let idle = now.saturating_sub(entry.last_access.load(Ordering::Relaxed));
        Duration::from_nanos(idle) >= self.idle_timeout
    }
}

impl fmt::Debug for GenerationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationCache")
            .field("entries", &self.len())
            .field("idle_timeout", &self.idle_timeout)
            .field("serializer", &self.serializer.name())
            .field("stats", &self.stats())
            .finish()
    }
}

fn nanos_since(origin: Instant, now: Instant) -> u64 {
    u64::try_from(now.saturating_duration_since(origin).as_nanos()).unwrap_or(u64::MAX)
}

/// 合成线程异常退出时解析占位并移除条目。
struct PendingGuard<'a> {
    cache: &'a GenerationCache,
    key: &'a CacheKey,
    factory: &'a InstanceFactory,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.fail(
                self.key,
                self.factory,
                GenerationError::Abandoned {
                    contract: self.key.contract.clone(),
                },
            );
        }
    }
}

/// [`GenerationCache`] 的构建器。
pub struct GenerationCacheBuilder {
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    serializer: Arc<dyn Serializer>,
    default_timeout: Option<Duration>,
    observer: Option<Arc<dyn GenerationObserver>>,
}

impl Default for GenerationCacheBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            idle_timeout: Duration::from_secs(crate::config::DEFAULT_CACHE_IDLE_SECS),
            serializer: Arc::new(JsonSerializer),
            default_timeout: None,
            observer: None,
        }
    }
}

impl GenerationCacheBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn default_timeout(mut self, default_timeout: Option<Duration>) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> GenerationCache {
        let origin = self.clock.now();
        GenerationCache {
            entries: Mutex::new(HashMap::new()),
            contracts: Mutex::new(HashMap::new()),
            clock: self.clock,
            origin,
            idle_timeout: self.idle_timeout,
            serializer: self.serializer,
            default_timeout: self.default_timeout,
            stats: Arc::new(StatCounters::default()),
            observer: self.observer,
        }
    }
}
