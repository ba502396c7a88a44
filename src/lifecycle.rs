//! 生命周期编排器
//!
//! 把解析后的模块序依次推过三个阶段，阶段之间是严格屏障：
//! 所有模块注册完服务才开始初始化，全部初始化完才开始配置。
//! 配置阶段支持延续协议：模块的 configure 返回 AwaitDependents 时，
//! 编排器先把所有依赖它的未配置模块推进到配置完成，
//! 再回调该模块的 after_dependents 收尾。
//!
//! 整个 load 调用是单逻辑线程的协作式调度，
//! 不存在模块配置的并行执行；任何阶段出错立即中止，不回滚。

use crate::config::ConfigRegistry;
use crate::container::ServiceContainer;
use crate::error::{KernelError, KernelResult};
use crate::graph::{module_key, ModuleRef};
use crate::token::ConfigToken;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// 模块生命周期状态，只向前推进
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulePhase {
    /// 尚未进入任何阶段
    Pending,
    /// 服务注册完成
    ServicesRegistered,
    /// 初始化完成（配置令牌已声明）
    Initialized,
    /// 配置进行中（已让出等待依赖方）
    Configuring,
    /// 终态：配置完成
    Configured,
}

/// configure 前半段的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// 模块配置完成，无后半段
    Configured,
    /// 让出：先配置所有依赖方，再回调 after_dependents
    AwaitDependents,
}

/// 阶段2上下文：声明配置令牌所有权
pub struct InitContext {
    services: Arc<ServiceContainer>,
    config: Arc<ConfigRegistry>,
    module: String,
}

impl InitContext {
    /// 服务容器
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// 配置注册表
    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    /// 以当前模块为所有者声明配置令牌
    pub fn declare<T, F>(&self, token: &ConfigToken<T>, factory: F) -> KernelResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.config.declare(token, &self.module, factory)?;
        Ok(())
    }
}

/// 阶段3上下文：读取共享配置对象和本模块的设置节
pub struct ConfigureContext {
    services: Arc<ServiceContainer>,
    config: Arc<ConfigRegistry>,
    module: String,
    settings: serde_json::Value,
}

impl ConfigureContext {
    /// 服务容器
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// 配置注册表
    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    /// 读取配置对象 - 便捷方法
    pub fn get<T: Send + Sync + 'static>(&self, token: &ConfigToken<T>) -> KernelResult<Arc<T>> {
        Ok(self.config.get(token)?)
    }

    /// 本模块的设置节（load 传入的 settings 按模块名查找，缺失为 Null）
    pub fn settings(&self) -> &serde_json::Value {
        &self.settings
    }

    /// 把设置节反序列化为指定类型；设置缺失返回 None
    ///
    /// 设置内容的语义校验是模块自己的责任，核心只做格式解析。
    pub fn settings_as<T: DeserializeOwned>(&self) -> KernelResult<Option<T>> {
        if self.settings.is_null() {
            return Ok(None);
        }
        serde_json::from_value(self.settings.clone())
            .map(Some)
            .map_err(|err| KernelError::Settings {
                module: self.module.clone(),
                reason: err.to_string(),
            })
    }
}

/// 生命周期编排器
pub struct Orchestrator {
    modules: Vec<ModuleRef>,
    phases: Vec<ModulePhase>,
    /// 直接依赖方（反向边）：dependents[i] = 依赖模块i的模块下标
    dependents: Vec<Vec<usize>>,
    services: Arc<ServiceContainer>,
    config: Arc<ConfigRegistry>,
    settings: serde_json::Value,
}

impl Orchestrator {
    /// 用解析后的模块序构建编排器
    pub fn new(
        modules: Vec<ModuleRef>,
        services: Arc<ServiceContainer>,
        config: Arc<ConfigRegistry>,
        settings: serde_json::Value,
    ) -> Self {
        let index: HashMap<usize, usize> = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (module_key(m), i))
            .collect();

        let mut dependents = vec![Vec::new(); modules.len()];
        for (i, module) in modules.iter().enumerate() {
            for dependency in module.dependencies() {
                // 解析序包含全部依赖，缺失说明图解析有bug
                if let Some(&j) = index.get(&module_key(&dependency)) {
                    dependents[j].push(i);
                }
            }
        }

        let phases = vec![ModulePhase::Pending; modules.len()];
        Self {
            modules,
            phases,
            dependents,
            services,
            config,
            settings,
        }
    }

    /// 依次执行三个阶段
    pub async fn run(&mut self) -> KernelResult<()> {
        self.run_registration()?;
        self.run_initialization().await?;
        self.run_configuration().await?;
        Ok(())
    }

    /// 阶段1：服务注册（同步）
    fn run_registration(&mut self) -> KernelResult<()> {
        for (i, module) in self.modules.iter().enumerate() {
            log::debug!("registering services for module '{}'", module.name());
            module.register_services(&self.services).map_err(|err| {
                log::error!("module '{}' failed during registration: {}", module.name(), err);
                err
            })?;
            self.phases[i] = ModulePhase::ServicesRegistered;
        }
        Ok(())
    }

    /// 阶段2：初始化
    async fn run_initialization(&mut self) -> KernelResult<()> {
        for (i, module) in self.modules.iter().enumerate() {
            log::debug!("initializing module '{}'", module.name());
            let cx = InitContext {
                services: self.services.clone(),
                config: self.config.clone(),
                module: module.name().to_string(),
            };
            module.initialize(&cx).await.map_err(|err| {
                log::error!("module '{}' failed during initialization: {}", module.name(), err);
                err
            })?;
            self.phases[i] = ModulePhase::Initialized;
        }
        Ok(())
    }

    /// 阶段3：配置，含延续协议
    async fn run_configuration(&mut self) -> KernelResult<()> {
        for i in 0..self.modules.len() {
            self.configure_module(i).await?;
        }
        Ok(())
    }

    /// 推进单个模块的配置；递归即延续协议的显式调用栈
    fn configure_module(
        &mut self,
        idx: usize,
    ) -> Pin<Box<dyn Future<Output = KernelResult<()>> + Send + '_>> {
        Box::pin(async move {
            match self.phases[idx] {
                ModulePhase::Configured | ModulePhase::Configuring => return Ok(()),
                _ => {}
            }
            self.phases[idx] = ModulePhase::Configuring;

            let module = self.modules[idx].clone();
            let cx = self.configure_context(idx);

            log::debug!("configuring module '{}'", module.name());
            let outcome = module.configure(&cx).await.map_err(|err| {
                log::error!("module '{}' failed during configuration: {}", module.name(), err);
                err
            })?;

            if outcome == ConfigureOutcome::AwaitDependents {
                let pending = self.pending_dependents(idx);
                log::debug!(
                    "module '{}' awaits {} unconfigured dependents",
                    module.name(),
                    pending.len()
                );
                for j in pending {
                    self.configure_module(j).await?;
                }
                module.after_dependents(&cx).await.map_err(|err| {
                    log::error!(
                        "module '{}' failed after its dependents configured: {}",
                        module.name(),
                        err
                    );
                    err
                })?;
            }

            self.phases[idx] = ModulePhase::Configured;
            Ok(())
        })
    }

    /// 模块idx的全部传递依赖方中尚未配置的，按解析序返回
    fn pending_dependents(&self, idx: usize) -> Vec<usize> {
        let mut reachable = vec![false; self.modules.len()];
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            for &j in &self.dependents[i] {
                if !reachable[j] {
                    reachable[j] = true;
                    stack.push(j);
                }
            }
        }
        (0..self.modules.len())
            .filter(|&j| reachable[j] && self.phases[j] == ModulePhase::Initialized)
            .collect()
    }

    fn configure_context(&self, idx: usize) -> ConfigureContext {
        let name = self.modules[idx].name();
        ConfigureContext {
            services: self.services.clone(),
            config: self.config.clone(),
            module: name.to_string(),
            settings: self
                .settings
                .get(name)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }
    }

    /// 编排完成后交出模块序和最终状态
    pub fn into_parts(self) -> (Vec<ModuleRef>, Vec<ModulePhase>) {
        (self.modules, self.phases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{resolve_graph, Module};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// 把每次回调记到共享日志里的测试模块
    struct RecordingModule {
        name: &'static str,
        deps: Vec<ModuleRef>,
        journal: Arc<Mutex<Vec<String>>>,
        yields: bool,
    }

    impl RecordingModule {
        fn new(
            name: &'static str,
            deps: Vec<ModuleRef>,
            journal: Arc<Mutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                deps,
                journal,
                yields: false,
            })
        }

        fn yielding(
            name: &'static str,
            deps: Vec<ModuleRef>,
            journal: Arc<Mutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                deps,
                journal,
                yields: true,
            })
        }

        fn record(&self, event: &str) {
            self.journal.lock().push(format!("{}:{}", self.name, event));
        }
    }

    #[async_trait]
    impl Module for RecordingModule {
        fn name(&self) -> &str {
            self.name
        }

        fn dependencies(&self) -> Vec<ModuleRef> {
            self.deps.clone()
        }

        fn register_services(&self, _services: &ServiceContainer) -> KernelResult<()> {
            self.record("register");
            Ok(())
        }

        async fn initialize(&self, _cx: &InitContext) -> KernelResult<()> {
            self.record("init");
            Ok(())
        }

        async fn configure(&self, _cx: &ConfigureContext) -> KernelResult<ConfigureOutcome> {
            if self.yields {
                self.record("configure_before");
                Ok(ConfigureOutcome::AwaitDependents)
            } else {
                self.record("configure");
                Ok(ConfigureOutcome::Configured)
            }
        }

        async fn after_dependents(&self, _cx: &ConfigureContext) -> KernelResult<()> {
            self.record("configure_after");
            Ok(())
        }
    }

    async fn run_orchestrator(roots: Vec<ModuleRef>) -> (Vec<ModuleRef>, Vec<ModulePhase>) {
        let resolved = resolve_graph(&roots).unwrap();
        let mut orchestrator = Orchestrator::new(
            resolved,
            Arc::new(ServiceContainer::new()),
            Arc::new(ConfigRegistry::new()),
            serde_json::Value::Null,
        );
        orchestrator.run().await.unwrap();
        orchestrator.into_parts()
    }

    #[tokio::test]
    async fn test_phase_barriers() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let core = RecordingModule::new("core", vec![], journal.clone());
        let app = RecordingModule::new("app", vec![core.clone() as ModuleRef], journal.clone());

        let (_, phases) = run_orchestrator(vec![app as ModuleRef]).await;
        assert!(phases.iter().all(|p| *p == ModulePhase::Configured));

        let events = journal.lock().clone();
        // 所有模块注册完才初始化，全部初始化完才配置
        assert_eq!(
            events,
            vec![
                "core:register",
                "app:register",
                "core:init",
                "app:init",
                "core:configure",
                "app:configure",
            ]
        );
    }

    #[tokio::test]
    async fn test_yielding_module_runs_after_dependents() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let core = RecordingModule::yielding("core", vec![], journal.clone());
        let feature =
            RecordingModule::new("feature", vec![core.clone() as ModuleRef], journal.clone());

        run_orchestrator(vec![feature as ModuleRef]).await;

        let events = journal.lock().clone();
        let configure_events: Vec<&String> = events
            .iter()
            .filter(|e| e.contains("configure"))
            .collect();
        assert_eq!(
            configure_events,
            vec!["core:configure_before", "feature:configure", "core:configure_after"]
        );
    }

    #[tokio::test]
    async fn test_nested_yields() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let core = RecordingModule::yielding("core", vec![], journal.clone());
        let mid = RecordingModule::yielding("mid", vec![core.clone() as ModuleRef], journal.clone());
        let leaf = RecordingModule::new("leaf", vec![mid.clone() as ModuleRef], journal.clone());

        run_orchestrator(vec![leaf as ModuleRef]).await;

        let events = journal.lock().clone();
        let configure_events: Vec<&str> = events
            .iter()
            .filter(|e| e.contains("configure"))
            .map(|e| e.as_str())
            .collect();
        // mid 在 core 的让出窗口内配置，自己再让出等 leaf
        assert_eq!(
            configure_events,
            vec![
                "core:configure_before",
                "mid:configure_before",
                "leaf:configure",
                "mid:configure_after",
                "core:configure_after",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_phases() {
        struct FailingModule;

        #[async_trait]
        impl Module for FailingModule {
            fn name(&self) -> &str {
                "failing"
            }

            async fn initialize(&self, _cx: &InitContext) -> KernelResult<()> {
                Err(KernelError::module("failing", "init exploded"))
            }
        }

        let journal = Arc::new(Mutex::new(Vec::new()));
        let ok_module = RecordingModule::new("ok", vec![Arc::new(FailingModule)], journal.clone());

        let resolved = resolve_graph(&[ok_module as ModuleRef]).unwrap();
        let mut orchestrator = Orchestrator::new(
            resolved,
            Arc::new(ServiceContainer::new()),
            Arc::new(ConfigRegistry::new()),
            serde_json::Value::Null,
        );
        let result = orchestrator.run().await;
        assert!(matches!(result, Err(KernelError::Module { .. })));

        // 配置阶段从未开始
        let events = journal.lock().clone();
        assert!(!events.iter().any(|e| e.contains("configure")));
    }

    #[tokio::test]
    async fn test_settings_section_lookup() {
        struct SettingsModule {
            seen: Arc<Mutex<Option<serde_json::Value>>>,
        }

        #[async_trait]
        impl Module for SettingsModule {
            fn name(&self) -> &str {
                "http"
            }

            async fn configure(&self, cx: &ConfigureContext) -> KernelResult<ConfigureOutcome> {
                *self.seen.lock() = Some(cx.settings().clone());
                Ok(ConfigureOutcome::Configured)
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let module = Arc::new(SettingsModule { seen: seen.clone() });

        let resolved = resolve_graph(&[module as ModuleRef]).unwrap();
        let mut orchestrator = Orchestrator::new(
            resolved,
            Arc::new(ServiceContainer::new()),
            Arc::new(ConfigRegistry::new()),
            serde_json::json!({ "http": { "port": 8080 }, "other": {} }),
        );
        orchestrator.run().await.unwrap();

        assert_eq!(
            seen.lock().clone(),
            Some(serde_json::json!({ "port": 8080 }))
        );
    }
}
