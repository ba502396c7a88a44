//! 模块生命周期演示：配置令牌聚合与延续协议
//!
//! 运行: cargo run --example module_lifecycle_demo

use async_trait::async_trait;
use modkit::{
    config_token, load, ConfigureContext, ConfigureOutcome, InitContext, KernelResult,
    LoadOptions, Module, ModuleRef,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// 各功能模块往里挂路由，宿主模块最后统一"挂载"
struct RouteTable {
    routes: Mutex<Vec<String>>,
}

impl RouteTable {
    fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    fn add_route(&self, route: &str) {
        self.routes.lock().push(route.to_string());
    }
}

config_token! {
    static ROUTES: RouteTable = "routes";
}

/// 宿主模块：声明路由表，等所有功能模块贡献完再挂载
struct ServerModule;

#[async_trait]
impl Module for ServerModule {
    fn name(&self) -> &str {
        "server"
    }

    async fn initialize(&self, cx: &InitContext) -> KernelResult<()> {
        cx.declare(&ROUTES, RouteTable::new)
    }

    async fn configure(&self, _cx: &ConfigureContext) -> KernelResult<ConfigureOutcome> {
        println!("[server] waiting for feature modules to contribute routes");
        Ok(ConfigureOutcome::AwaitDependents)
    }

    async fn after_dependents(&self, cx: &ConfigureContext) -> KernelResult<()> {
        let table = cx.get(&ROUTES)?;
        println!("[server] mounting routes: {:?}", table.routes.lock());
        Ok(())
    }
}

/// 功能模块：贡献一条路由
struct FeatureModule {
    name: &'static str,
    route: &'static str,
    deps: Vec<ModuleRef>,
}

#[async_trait]
impl Module for FeatureModule {
    fn name(&self) -> &str {
        self.name
    }

    fn dependencies(&self) -> Vec<ModuleRef> {
        self.deps.clone()
    }

    async fn configure(&self, cx: &ConfigureContext) -> KernelResult<ConfigureOutcome> {
        cx.get(&ROUTES)?.add_route(self.route);
        println!("[{}] contributed route {}", self.name, self.route);
        Ok(ConfigureOutcome::Configured)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let server = Arc::new(ServerModule);
    let users = Arc::new(FeatureModule {
        name: "users",
        route: "/users",
        deps: vec![server.clone() as ModuleRef],
    });
    let orders = Arc::new(FeatureModule {
        name: "orders",
        route: "/orders",
        deps: vec![server.clone() as ModuleRef],
    });

    let host = load(
        vec![users as ModuleRef, orders as ModuleRef],
        LoadOptions::default(),
    )
    .await?;

    for (name, phase) in host.module_phases() {
        println!("module {:10} -> {:?}", name, phase);
    }

    host.shutdown().await?;
    Ok(())
}
