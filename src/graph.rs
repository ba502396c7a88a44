//! 模块抽象与模块图解析
//!
//! 模块身份按对象（Arc指针）判定，名称唯一性单独校验：
//! 同一个模块对象经由多条依赖路径到达只折叠为一个节点，
//! 两个不同对象共享一个名称则是致命冲突。

use crate::container::ServiceContainer;
use crate::error::KernelError;
use crate::lifecycle::{ConfigureContext, ConfigureOutcome, InitContext};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// 模块引用
pub type ModuleRef = Arc<dyn Module>;

/// 模块接口
///
/// 一个模块声明依赖和至多三个生命周期回调；全部回调都有空默认实现，
/// 模块只需要实现自己关心的阶段。
#[async_trait]
pub trait Module: Send + Sync {
    /// 模块名称（解析后的图内唯一）
    fn name(&self) -> &str;

    /// 模块版本（仅诊断用）
    fn version(&self) -> &str {
        "0.1.0"
    }

    /// 依赖的模块
    fn dependencies(&self) -> Vec<ModuleRef> {
        Vec::new()
    }

    /// 阶段1：注册服务条目（同步，按解析顺序）
    fn register_services(&self, _services: &ServiceContainer) -> Result<(), KernelError> {
        Ok(())
    }

    /// 阶段2：声明配置令牌所有权（按解析顺序）
    async fn initialize(&self, _cx: &InitContext) -> Result<(), KernelError> {
        Ok(())
    }

    /// 阶段3前半：模块自身的配置
    ///
    /// 返回 [`ConfigureOutcome::AwaitDependents`] 表示让出控制权，
    /// 编排器先把所有依赖本模块的未配置模块推进到配置完成，
    /// 再回调 [`after_dependents`] 执行后半段。
    ///
    /// [`after_dependents`]: Module::after_dependents
    async fn configure(&self, _cx: &ConfigureContext) -> Result<ConfigureOutcome, KernelError> {
        Ok(ConfigureOutcome::Configured)
    }

    /// 阶段3后半：所有依赖方配置完成后执行
    ///
    /// 仅当 configure 返回 AwaitDependents 时被调用。
    async fn after_dependents(&self, _cx: &ConfigureContext) -> Result<(), KernelError> {
        Ok(())
    }

    /// 宿主关闭时按解析逆序调用
    async fn shutdown(&self, _services: &ServiceContainer) -> Result<(), KernelError> {
        Ok(())
    }
}

/// 模块图错误
#[derive(Debug)]
pub enum GraphError {
    /// 根模块列表为空
    EmptyRoots,
    /// 两个不同的模块对象共享一个名称
    DuplicateModule { name: String },
    /// 依赖图成环，path 是环路上的模块名
    CyclicDependency { path: Vec<String> },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::EmptyRoots => write!(f, "Module list is empty"),
            GraphError::DuplicateModule { name } => {
                write!(
                    f,
                    "Two distinct modules share the name '{}'",
                    name
                )
            }
            GraphError::CyclicDependency { path } => {
                write!(f, "Cyclic module dependency: {}", path.join(" -> "))
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// 模块对象的身份键（Arc数据指针）
pub(crate) fn module_key(module: &ModuleRef) -> usize {
    Arc::as_ptr(module) as *const () as usize
}

/// 把根模块集合压平为去重的依赖序
///
/// 从每个根做深度优先遍历，依赖先于节点发射（后序），
/// 平局按遍历顺序（第一个根、第一个声明的依赖在前），
/// 相同输入的解析结果可复现。
pub fn resolve_graph(roots: &[ModuleRef]) -> Result<Vec<ModuleRef>, GraphError> {
    if roots.is_empty() {
        return Err(GraphError::EmptyRoots);
    }

    let mut resolver = GraphResolver {
        order: Vec::new(),
        emitted: HashSet::new(),
        visiting: Vec::new(),
        names: HashMap::new(),
    };
    for root in roots {
        resolver.visit(root)?;
    }

    log::debug!(
        "resolved module graph: [{}]",
        resolver
            .order
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(resolver.order)
}

struct GraphResolver {
    order: Vec<ModuleRef>,
    emitted: HashSet<usize>,
    visiting: Vec<(usize, String)>,
    names: HashMap<String, usize>,
}

impl GraphResolver {
    fn visit(&mut self, module: &ModuleRef) -> Result<(), GraphError> {
        let key = module_key(module);
        if self.emitted.contains(&key) {
            return Ok(());
        }

        // 仍在访问中的节点被重入即成环
        if self.visiting.iter().any(|(k, _)| *k == key) {
            let start = self
                .visiting
                .iter()
                .position(|(k, _)| *k == key)
                .unwrap_or(0);
            let mut path: Vec<String> = self.visiting[start..]
                .iter()
                .map(|(_, name)| name.clone())
                .collect();
            path.push(module.name().to_string());
            return Err(GraphError::CyclicDependency { path });
        }

        let name = module.name().to_string();
        if let Some(existing) = self.names.get(&name) {
            if *existing != key {
                return Err(GraphError::DuplicateModule { name });
            }
        } else {
            self.names.insert(name.clone(), key);
        }

        self.visiting.push((key, name));
        for dependency in module.dependencies() {
            self.visit(&dependency)?;
        }
        self.visiting.pop();

        self.emitted.insert(key);
        self.order.push(module.clone());
        Ok(())
    }
}
