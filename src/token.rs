//! 服务与配置令牌
//!
//! 容器条目不按结构类型寻址，而是按令牌身份寻址：
//! - 每个令牌持有一个进程内唯一的数字ID，相等性只比较ID
//! - 名称仅用于诊断信息和错误提示
//! - 同一个Rust类型可以对应多个互不相干的令牌

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// 令牌ID类型
pub type TokenId = u64;

/// 全局令牌ID分配器
static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_token_id() -> TokenId {
    NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)
}

macro_rules! define_token {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name<T> {
            id: TokenId,
            name: &'static str,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T> $name<T> {
            /// 创建新令牌；每次调用产生一个新的身份
            pub fn new(name: &'static str) -> Self {
                Self {
                    id: allocate_token_id(),
                    name,
                    _marker: PhantomData,
                }
            }

            /// 令牌的唯一ID
            pub fn id(&self) -> TokenId {
                self.id
            }

            /// 诊断用名称
            pub fn name(&self) -> &'static str {
                self.name
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl<T> Eq for $name<T> {}

        impl<T> std::hash::Hash for $name<T> {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}#{})", stringify!($name), self.name, self.id)
            }
        }
    };
}

define_token! {
    /// 服务令牌 - 标识容器中的一个服务条目
    ///
    /// 相等性按身份比较而非按名称；两个同名令牌是两个不同的条目。
    ServiceToken
}

define_token! {
    /// 配置令牌 - 标识一个共享配置聚合对象
    ///
    /// 恰好一个模块在初始化阶段声明其工厂（单一所有者），
    /// 任何持有令牌引用的模块都可以在配置阶段读取并扩展该对象。
    ConfigToken
}

/// 声明静态服务令牌的便捷宏
///
/// ```ignore
/// service_token! {
///     pub static HTTP_OPTIONS: HttpOptions = "http_options";
/// }
/// ```
#[macro_export]
macro_rules! service_token {
    (static $NAME:ident : $ty:ty = $name:expr; $($rest:tt)*) => {
        $crate::lazy_static::lazy_static! {
            static ref $NAME: $crate::ServiceToken<$ty> =
                $crate::ServiceToken::new($name);
        }
        $crate::service_token!($($rest)*);
    };
    (pub static $NAME:ident : $ty:ty = $name:expr; $($rest:tt)*) => {
        $crate::lazy_static::lazy_static! {
            pub static ref $NAME: $crate::ServiceToken<$ty> =
                $crate::ServiceToken::new($name);
        }
        $crate::service_token!($($rest)*);
    };
    (pub ($($vis:tt)+) static $NAME:ident : $ty:ty = $name:expr; $($rest:tt)*) => {
        $crate::lazy_static::lazy_static! {
            pub ($($vis)+) static ref $NAME: $crate::ServiceToken<$ty> =
                $crate::ServiceToken::new($name);
        }
        $crate::service_token!($($rest)*);
    };
    () => {};
}

/// 声明静态配置令牌的便捷宏
#[macro_export]
macro_rules! config_token {
    (static $NAME:ident : $ty:ty = $name:expr; $($rest:tt)*) => {
        $crate::lazy_static::lazy_static! {
            static ref $NAME: $crate::ConfigToken<$ty> =
                $crate::ConfigToken::new($name);
        }
        $crate::config_token!($($rest)*);
    };
    (pub static $NAME:ident : $ty:ty = $name:expr; $($rest:tt)*) => {
        $crate::lazy_static::lazy_static! {
            pub static ref $NAME: $crate::ConfigToken<$ty> =
                $crate::ConfigToken::new($name);
        }
        $crate::config_token!($($rest)*);
    };
    (pub ($($vis:tt)+) static $NAME:ident : $ty:ty = $name:expr; $($rest:tt)*) => {
        $crate::lazy_static::lazy_static! {
            pub ($($vis)+) static ref $NAME: $crate::ConfigToken<$ty> =
                $crate::ConfigToken::new($name);
        }
        $crate::config_token!($($rest)*);
    };
    () => {};
}
