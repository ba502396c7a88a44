//! 模块宿主与装载入口
//!
//! load 是整个运行时的对外入口：解析模块图、驱动三阶段生命周期、
//! 应用宿主扩展流水线，最后交出 ModuleHost。
//! 模块图本身在编排结束后即被丢弃，宿主只保留服务容器、
//! 配置注册表和用于逆序关闭的模块序。

use crate::config::ConfigRegistry;
use crate::container::ServiceContainer;
use crate::error::KernelResult;
use crate::graph::{resolve_graph, ModuleRef};
use crate::lifecycle::{ModulePhase, Orchestrator};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// 宿主扩展 - 编排完成后按顺序装饰宿主的能力提供者
///
/// 典型用法：给宿主挂一个网络监听句柄。
#[async_trait]
pub trait HostExtension: Send + Sync {
    /// 扩展名称（诊断用）
    fn name(&self) -> &str;

    /// 装饰宿主；失败会让整个 load 调用失败
    async fn apply(&self, host: &mut ModuleHost) -> KernelResult<()>;
}

/// load 的可选项
pub struct LoadOptions {
    /// 自由形式的嵌套设置表；按模块名查节传给各自的 configure
    pub settings: serde_json::Value,
    /// 宿主扩展流水线，按声明顺序应用
    pub extensions: Vec<Box<dyn HostExtension>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            settings: serde_json::Value::Null,
            extensions: Vec::new(),
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 settings 表 - 链式调用
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// 追加宿主扩展 - 链式调用
    pub fn with_extension(mut self, extension: Box<dyn HostExtension>) -> Self {
        self.extensions.push(extension);
        self
    }
}

/// 模块宿主 - 编排成功后对外暴露的句柄
pub struct ModuleHost {
    services: Arc<ServiceContainer>,
    config: Arc<ConfigRegistry>,
    /// 解析序的模块，保留用于状态查询和逆序关闭
    modules: Vec<ModuleRef>,
    phases: Vec<ModulePhase>,
    /// 扩展挂上来的命名值
    values: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ModuleHost {
    /// 最终的服务容器，进程生命周期内存活
    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    /// 配置注册表
    pub fn config(&self) -> &Arc<ConfigRegistry> {
        &self.config
    }

    /// 查询单个模块的生命周期状态
    pub fn module_phase(&self, name: &str) -> Option<ModulePhase> {
        self.modules
            .iter()
            .position(|m| m.name() == name)
            .map(|i| self.phases[i])
    }

    /// 所有模块的状态，按解析序
    pub fn module_phases(&self) -> Vec<(String, ModulePhase)> {
        self.modules
            .iter()
            .zip(self.phases.iter())
            .map(|(m, p)| (m.name().to_string(), *p))
            .collect()
    }

    /// 挂一个命名值到宿主上（扩展用）
    pub fn insert_value<T: Send + Sync + 'static>(&self, name: &str, value: T) {
        self.values
            .write()
            .insert(name.to_string(), Arc::new(value));
    }

    /// 取扩展挂的命名值；名称不存在或类型不符返回None
    pub fn value<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let values = self.values.read();
        values
            .get(name)
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// 按解析逆序关闭所有模块
    ///
    /// 任何模块关闭失败即中止，剩余模块不再关闭。
    pub async fn shutdown(&self) -> KernelResult<()> {
        for module in self.modules.iter().rev() {
            log::debug!("shutting down module '{}'", module.name());
            module.shutdown(&self.services).await.map_err(|err| {
                log::error!("module '{}' failed during shutdown: {}", module.name(), err);
                err
            })?;
        }
        Ok(())
    }
}

/// 装载模块集合，返回模块宿主
///
/// 流程：解析模块图 → 服务注册 → 初始化 → 配置（含延续协议）
/// → 应用宿主扩展。任一步失败整个调用失败，无部分成功返回值。
pub async fn load(modules: Vec<ModuleRef>, options: LoadOptions) -> KernelResult<ModuleHost> {
    let resolved = resolve_graph(&modules)?;
    log::info!(
        "loading {} modules: [{}]",
        resolved.len(),
        resolved
            .iter()
            .map(|m| format!("{}@{}", m.name(), m.version()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let services = Arc::new(ServiceContainer::new());
    let config = Arc::new(ConfigRegistry::new());

    let mut orchestrator = Orchestrator::new(
        resolved,
        services.clone(),
        config.clone(),
        options.settings,
    );
    orchestrator.run().await?;
    let (modules, phases) = orchestrator.into_parts();

    let mut host = ModuleHost {
        services,
        config,
        modules,
        phases,
        values: RwLock::new(HashMap::new()),
    };

    for extension in &options.extensions {
        log::debug!("applying host extension '{}'", extension.name());
        extension.apply(&mut host).await?;
    }

    log::info!("module host ready");
    Ok(host)
}
