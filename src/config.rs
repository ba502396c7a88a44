//! 配置聚合器
//!
//! 每个配置令牌对应一个共享的、可增量扩展的配置对象：
//! - 初始化阶段恰好一个模块用 declare 声明工厂（单一所有者，重复声明报错）
//! - 配置阶段任意持有令牌的模块通过 get 读取并调用对象自身的扩展方法
//! - 对象在第一次 get 时惰性构造，之后所有读取共享同一实例

use crate::token::{ConfigToken, TokenId};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 配置聚合错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置令牌被第二个模块声明
    DuplicateOwner {
        token: &'static str,
        owner: String,
        previous: String,
    },
    /// 读取未声明的配置令牌
    Unregistered { token: &'static str },
    /// 实例与请求类型不一致
    TypeMismatch {
        token: &'static str,
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DuplicateOwner {
                token,
                owner,
                previous,
            } => {
                write!(
                    f,
                    "Configuration token '{}' is already owned by module '{}' (module '{}' attempted a second declaration)",
                    token, previous, owner
                )
            }
            ConfigError::Unregistered { token } => {
                write!(
                    f,
                    "Configuration token '{}' has not been declared by any module",
                    token
                )
            }
            ConfigError::TypeMismatch { token, expected } => {
                write!(
                    f,
                    "Type mismatch for configuration token '{}': expected {}",
                    token, expected
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

type AnyInstance = Arc<dyn Any + Send + Sync>;

struct ConfigEntry {
    owner: String,
    factory: Arc<dyn Fn() -> AnyInstance + Send + Sync>,
    cell: Arc<OnceCell<AnyInstance>>,
}

/// 配置聚合注册表
pub struct ConfigRegistry {
    entries: DashMap<TokenId, ConfigEntry>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// 声明配置令牌的工厂，owner 是声明模块的名称
    ///
    /// 每个令牌只能声明一次；第二次声明是致命错误。
    pub fn declare<T, F>(
        &self,
        token: &ConfigToken<T>,
        owner: &str,
        factory: F,
    ) -> Result<(), ConfigError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        if let Some(existing) = self.entries.get(&token.id()) {
            return Err(ConfigError::DuplicateOwner {
                token: token.name(),
                owner: owner.to_string(),
                previous: existing.owner.clone(),
            });
        }
        log::debug!("module '{}' declared config token '{}'", owner, token.name());
        self.entries.insert(
            token.id(),
            ConfigEntry {
                owner: owner.to_string(),
                factory: Arc::new(move || Arc::new(factory()) as AnyInstance),
                cell: Arc::new(OnceCell::new()),
            },
        );
        Ok(())
    }

    /// 获取配置对象，第一次读取时惰性构造
    pub fn get<T: Send + Sync + 'static>(
        &self,
        token: &ConfigToken<T>,
    ) -> Result<Arc<T>, ConfigError> {
        // 克隆出工厂和cell后释放分片锁，构造期间不阻塞其它令牌
        let (factory, cell) = {
            let entry = self
                .entries
                .get(&token.id())
                .ok_or(ConfigError::Unregistered {
                    token: token.name(),
                })?;
            (entry.factory.clone(), entry.cell.clone())
        };

        let instance = cell.get_or_init(|| factory()).clone();
        instance
            .downcast::<T>()
            .map_err(|_| ConfigError::TypeMismatch {
                token: token.name(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// 令牌是否已声明
    pub fn is_declared<T>(&self, token: &ConfigToken<T>) -> bool {
        self.entries.contains_key(&token.id())
    }

    /// 声明了指定令牌的模块名称
    pub fn owner_of<T>(&self, token: &ConfigToken<T>) -> Option<String> {
        self.entries.get(&token.id()).map(|e| e.owner.clone())
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}
