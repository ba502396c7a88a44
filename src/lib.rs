//! modkit - 模块组合与依赖注入运行时
//!
//! 进程内的组合引擎：
//! - 把声明的模块集合解析为确定性的初始化顺序
//! - 按"注册 → 初始化 → 配置"三阶段驱动模块生命周期，
//!   配置阶段支持延续协议（先让依赖方配置完再收尾）
//! - 分层服务容器，支持单例/瞬态/作用域三种生命周期和工厂注入
//! - 模块发布并增量扩展的强类型共享配置对象
//!
//! 不做网络I/O、不做持久化、不做分布式协调。

pub mod config;
pub mod container;
pub mod error;
pub mod graph;
pub mod host;
pub mod lifecycle;
pub mod token;

// Re-export commonly used items for convenience
pub use config::{ConfigError, ConfigRegistry};
pub use container::{ContainerError, ContainerStats, Lifetime, Resolver, ScopeInfo, ServiceContainer};
pub use error::{KernelError, KernelResult};
pub use graph::{resolve_graph, GraphError, Module, ModuleRef};
pub use host::{load, HostExtension, LoadOptions, ModuleHost};
pub use lifecycle::{ConfigureContext, ConfigureOutcome, InitContext, ModulePhase};
pub use token::{ConfigToken, ServiceToken, TokenId};

// 供 service_token!/config_token! 宏展开使用
pub use lazy_static;
