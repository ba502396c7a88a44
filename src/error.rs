// modkit 统一错误类型
//
// 生命周期三个阶段中的任何错误都会中止整个 load 调用，
// 不做局部恢复、不做回滚，由调用方决定如何处理

use crate::config::ConfigError;
use crate::container::ContainerError;
use crate::graph::GraphError;
use std::fmt;

/// 组合运行时统一错误
#[derive(Debug)]
pub enum KernelError {
    /// 模块图错误（重名冲突、循环依赖）
    Graph(GraphError),
    /// 服务容器错误
    Container(ContainerError),
    /// 配置聚合错误
    Config(ConfigError),
    /// 模块设置解析失败
    Settings { module: String, reason: String },
    /// 模块自身回调报告的失败
    Module { module: String, message: String },
}

impl KernelError {
    /// 构造模块级失败，标明出错的模块
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        KernelError::Module {
            module: module.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Graph(err) => write!(f, "Module graph error: {}", err),
            KernelError::Container(err) => write!(f, "Container error: {}", err),
            KernelError::Config(err) => write!(f, "Configuration error: {}", err),
            KernelError::Settings { module, reason } => {
                write!(f, "Invalid settings for module '{}': {}", module, reason)
            }
            KernelError::Module { module, message } => {
                write!(f, "Module '{}' failed: {}", module, message)
            }
        }
    }
}

impl std::error::Error for KernelError {}

// 便捷转换实现
impl From<GraphError> for KernelError {
    fn from(err: GraphError) -> Self {
        KernelError::Graph(err)
    }
}

impl From<ContainerError> for KernelError {
    fn from(err: ContainerError) -> Self {
        KernelError::Container(err)
    }
}

impl From<ConfigError> for KernelError {
    fn from(err: ConfigError) -> Self {
        KernelError::Config(err)
    }
}

/// 统一结果类型
pub type KernelResult<T> = Result<T, KernelError>;
