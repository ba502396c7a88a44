//! 依赖注入容器实现
//!
//! 提供按令牌寻址的服务注册和解析功能，支持：
//! - 单例模式（容器生命周期内至多构造一次，构造按 token 串行化）
//! - 瞬态模式（每次解析都创建新实例）
//! - 作用域模式（每个作用域缓存一个实例，无作用域时解析报错）
//! - 工厂注入（工厂通过 Resolver 递归解析自身依赖）
//! - 循环依赖检测（按解析栈检测）

use crate::token::{ServiceToken, TokenId};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 服务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// 单例 - 整个容器生命周期只有一个实例
    Singleton,
    /// 瞬态 - 每次解析都创建新实例
    Transient,
    /// 作用域 - 在单个作用域内共享实例
    Scoped,
}

/// 依赖注入容器错误
#[derive(Debug)]
pub enum ContainerError {
    /// 令牌已注册 - 默认禁止重复绑定，测试覆盖请用 register_override
    DuplicateRegistration { token: &'static str },
    /// 服务未注册 - 附带当前已注册的令牌列表
    Unregistered {
        token: &'static str,
        registered: Vec<&'static str>,
    },
    /// 作用域服务在无作用域的容器上解析
    NoActiveScope { token: &'static str },
    /// 工厂注入形成环
    CircularResolution { chain: Vec<&'static str> },
    /// 缓存实例与请求类型不一致
    TypeMismatch {
        token: &'static str,
        expected: &'static str,
    },
    /// 工厂执行失败
    CreationFailed { token: &'static str, reason: String },
}

impl ContainerError {
    /// 构造工厂失败错误的便捷方法
    pub fn creation_failed(token: &'static str, reason: impl Into<String>) -> Self {
        ContainerError::CreationFailed {
            token,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::DuplicateRegistration { token } => {
                write!(
                    f,
                    "Service token '{}' is already registered (use register_override to replace it)",
                    token
                )
            }
            ContainerError::Unregistered { token, registered } => {
                write!(f, "Service token '{}' is not registered", token)?;
                if !registered.is_empty() {
                    write!(f, ". Registered tokens: {}", registered.join(", "))?;
                }
                Ok(())
            }
            ContainerError::NoActiveScope { token } => {
                write!(
                    f,
                    "Scoped service '{}' resolved outside of a scope; call create_scope first",
                    token
                )
            }
            ContainerError::CircularResolution { chain } => {
                write!(f, "Circular resolution detected: {}", chain.join(" -> "))
            }
            ContainerError::TypeMismatch { token, expected } => {
                write!(
                    f,
                    "Type mismatch for token '{}': expected {}",
                    token, expected
                )
            }
            ContainerError::CreationFailed { token, reason } => {
                write!(f, "Failed to create service '{}': {}", token, reason)
            }
        }
    }
}

impl std::error::Error for ContainerError {}

type AnyInstance = Arc<dyn Any + Send + Sync>;
type ErasedFactory =
    dyn Fn(&Resolver<'_>) -> Result<AnyInstance, ContainerError> + Send + Sync;

/// 服务注册信息
#[derive(Clone)]
struct Registration {
    lifetime: Lifetime,
    factory: Arc<ErasedFactory>,
    token_name: &'static str,
}

/// 容器统计信息（内部原子计数器）
#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicU64,
    singleton_cache_hits: AtomicU64,
    singleton_cache_misses: AtomicU64,
    transient_creations: AtomicU64,
    scoped_creations: AtomicU64,
}

/// 容器统计信息快照
#[derive(Debug, Clone)]
pub struct ContainerStats {
    pub total_resolutions: u64,
    pub singleton_cache_hits: u64,
    pub singleton_cache_misses: u64,
    pub transient_creations: u64,
    pub scoped_creations: u64,
    pub registered_services: usize,
}

impl ContainerStats {
    /// 获取单例缓存命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.singleton_cache_hits + self.singleton_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.singleton_cache_hits as f64 / total as f64
        }
    }
}

/// 作用域信息
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    /// 作用域ID
    pub id: uuid::Uuid,
    /// 作用域标签（诊断用）
    pub label: String,
    /// 创建时间
    pub created_at: Instant,
}

impl ScopeInfo {
    fn new(label: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            label: label.to_string(),
            created_at: Instant::now(),
        }
    }
}

/// 作用域实例缓存
struct ScopeCache {
    info: ScopeInfo,
    instances: DashMap<TokenId, Arc<OnceCell<AnyInstance>>>,
}

/// 容器共享核心：注册表和单例缓存在根容器与所有作用域之间共享
struct ContainerCore {
    registrations: DashMap<TokenId, Registration>,
    singletons: DashMap<TokenId, Arc<OnceCell<AnyInstance>>>,
    stats: InnerStats,
}

/// 依赖注入容器
///
/// `create_scope` 产生的子容器与父容器共享全部 Singleton/Transient 绑定，
/// 但持有隔离的作用域实例缓存。
#[derive(Clone)]
pub struct ServiceContainer {
    core: Arc<ContainerCore>,
    scope: Option<Arc<ScopeCache>>,
}

impl ServiceContainer {
    /// 创建新的根容器
    pub fn new() -> Self {
        Self {
            core: Arc::new(ContainerCore {
                registrations: DashMap::new(),
                singletons: DashMap::new(),
                stats: InnerStats::default(),
            }),
            scope: None,
        }
    }

    /// 注册服务
    ///
    /// 同一令牌重复注册默认报错；测试场景的覆盖注册请用 [`register_override`]。
    ///
    /// [`register_override`]: ServiceContainer::register_override
    pub fn register<T, F>(
        &self,
        token: &ServiceToken<T>,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        if self.core.registrations.contains_key(&token.id()) {
            return Err(ContainerError::DuplicateRegistration {
                token: token.name(),
            });
        }
        self.insert_registration(token, lifetime, factory);
        Ok(())
    }

    /// 覆盖注册 - 静默替换已有绑定并丢弃已缓存的单例
    ///
    /// 仅用于显式的替换意图（典型场景：测试中替换真实实现）。
    pub fn register_override<T, F>(&self, token: &ServiceToken<T>, lifetime: Lifetime, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        log::debug!("overriding registration for token '{}'", token.name());
        self.core.singletons.remove(&token.id());
        self.insert_registration(token, lifetime, factory);
    }

    /// 注册单例服务 - 便捷方法
    pub fn register_singleton<T, F>(
        &self,
        token: &ServiceToken<T>,
        factory: F,
    ) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.register(token, Lifetime::Singleton, factory)
    }

    /// 注册瞬态服务 - 便捷方法
    pub fn register_transient<T, F>(
        &self,
        token: &ServiceToken<T>,
        factory: F,
    ) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.register(token, Lifetime::Transient, factory)
    }

    /// 注册作用域服务 - 便捷方法
    pub fn register_scoped<T, F>(
        &self,
        token: &ServiceToken<T>,
        factory: F,
    ) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.register(token, Lifetime::Scoped, factory)
    }

    /// 注册已构造的实例（按单例处理）
    pub fn register_instance<T>(
        &self,
        token: &ServiceToken<T>,
        instance: T,
    ) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let shared: AnyInstance = Arc::new(instance);
        if self.core.registrations.contains_key(&token.id()) {
            return Err(ContainerError::DuplicateRegistration {
                token: token.name(),
            });
        }
        let registration = Registration {
            lifetime: Lifetime::Singleton,
            factory: Arc::new(move |_| Ok(shared.clone())),
            token_name: token.name(),
        };
        self.core.registrations.insert(token.id(), registration);
        Ok(())
    }

    fn insert_registration<T, F>(&self, token: &ServiceToken<T>, lifetime: Lifetime, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        let registration = Registration {
            lifetime,
            factory: Arc::new(move |resolver: &Resolver<'_>| {
                let instance = factory(resolver)?;
                Ok(Arc::new(instance) as AnyInstance)
            }),
            token_name: token.name(),
        };
        self.core.registrations.insert(token.id(), registration);
    }

    /// 解析服务 - 主要API
    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        token: &ServiceToken<T>,
    ) -> Result<Arc<T>, ContainerError> {
        let resolver = Resolver {
            container: self,
            stack: RefCell::new(Vec::new()),
        };
        resolver.resolve(token)
    }

    /// 创建作用域子容器
    ///
    /// 共享注册表和单例缓存，作用域实例缓存相互隔离。
    pub fn create_scope(&self, label: &str) -> ServiceContainer {
        let info = ScopeInfo::new(label);
        log::debug!("creating scope '{}' ({})", label, info.id);
        ServiceContainer {
            core: self.core.clone(),
            scope: Some(Arc::new(ScopeCache {
                info,
                instances: DashMap::new(),
            })),
        }
    }

    /// 当前容器是否是作用域
    pub fn is_scope(&self) -> bool {
        self.scope.is_some()
    }

    /// 当前作用域信息（根容器返回None）
    pub fn scope_info(&self) -> Option<ScopeInfo> {
        self.scope.as_ref().map(|s| s.info.clone())
    }

    /// 检查令牌是否已注册
    pub fn is_registered<T>(&self, token: &ServiceToken<T>) -> bool {
        self.core.registrations.contains_key(&token.id())
    }

    /// 获取已注册令牌的名称列表
    pub fn registered_tokens(&self) -> Vec<&'static str> {
        self.core
            .registrations
            .iter()
            .map(|entry| entry.value().token_name)
            .collect()
    }

    /// 获取容器统计信息
    pub fn stats(&self) -> ContainerStats {
        let stats = &self.core.stats;
        ContainerStats {
            total_resolutions: stats.total_resolutions.load(Ordering::Relaxed),
            singleton_cache_hits: stats.singleton_cache_hits.load(Ordering::Relaxed),
            singleton_cache_misses: stats.singleton_cache_misses.load(Ordering::Relaxed),
            transient_creations: stats.transient_creations.load(Ordering::Relaxed),
            scoped_creations: stats.scoped_creations.load(Ordering::Relaxed),
            registered_services: self.core.registrations.len(),
        }
    }

    /// 按生命周期策略解析类型擦除的实例
    fn resolve_erased(
        &self,
        id: TokenId,
        name: &'static str,
        resolver: &Resolver<'_>,
    ) -> Result<AnyInstance, ContainerError> {
        self.core
            .stats
            .total_resolutions
            .fetch_add(1, Ordering::Relaxed);

        // 先克隆出注册信息再执行工厂，避免在持有分片锁时重入注册表
        let registration = self
            .core
            .registrations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ContainerError::Unregistered {
                token: name,
                registered: self.registered_tokens(),
            })?;

        match registration.lifetime {
            Lifetime::Transient => {
                self.core
                    .stats
                    .transient_creations
                    .fetch_add(1, Ordering::Relaxed);
                (registration.factory)(resolver)
            }
            Lifetime::Singleton => {
                let cell = {
                    let entry = self.core.singletons.entry(id).or_default();
                    entry.value().clone()
                };
                if let Some(cached) = cell.get() {
                    self.core
                        .stats
                        .singleton_cache_hits
                        .fetch_add(1, Ordering::Relaxed);
                    return Ok(cached.clone());
                }
                // OnceCell 保证工厂至多执行一次，并发解析时其余线程阻塞等待
                let instance = cell.get_or_try_init(|| {
                    self.core
                        .stats
                        .singleton_cache_misses
                        .fetch_add(1, Ordering::Relaxed);
                    (registration.factory)(resolver)
                })?;
                Ok(instance.clone())
            }
            Lifetime::Scoped => {
                let scope = self
                    .scope
                    .as_ref()
                    .ok_or(ContainerError::NoActiveScope { token: name })?;
                let cell = {
                    let entry = scope.instances.entry(id).or_default();
                    entry.value().clone()
                };
                if let Some(cached) = cell.get() {
                    return Ok(cached.clone());
                }
                let instance = cell.get_or_try_init(|| {
                    self.core
                        .stats
                        .scoped_creations
                        .fetch_add(1, Ordering::Relaxed);
                    (registration.factory)(resolver)
                })?;
                Ok(instance.clone())
            }
        }
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析句柄 - 工厂注入的入口
///
/// 工厂通过它解析自身依赖；内部携带本次解析的"进行中"令牌栈，
/// 构造依赖环时以 CircularResolution 报错而不是栈溢出。
pub struct Resolver<'a> {
    container: &'a ServiceContainer,
    stack: RefCell<Vec<(TokenId, &'static str)>>,
}

impl Resolver<'_> {
    /// 解析服务，递归调用共享同一个解析栈
    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        token: &ServiceToken<T>,
    ) -> Result<Arc<T>, ContainerError> {
        {
            let stack = self.stack.borrow();
            if stack.iter().any(|(id, _)| *id == token.id()) {
                let mut chain: Vec<&'static str> =
                    stack.iter().map(|(_, name)| *name).collect();
                chain.push(token.name());
                return Err(ContainerError::CircularResolution { chain });
            }
        }

        self.stack.borrow_mut().push((token.id(), token.name()));
        let result = self
            .container
            .resolve_erased(token.id(), token.name(), self);
        self.stack.borrow_mut().pop();

        let instance = result?;
        instance
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                token: token.name(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// 所属容器
    pub fn container(&self) -> &ServiceContainer {
        self.container
    }
}
