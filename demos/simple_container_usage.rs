//! 服务容器的基本用法示例
//!
//! 运行: cargo run --example simple_container_usage

use modkit::{service_token, Lifetime, ServiceContainer};
use std::sync::Arc;

/// 应用配置服务
struct AppConfig {
    endpoint: String,
}

/// 依赖配置的客户端服务
struct ApiClient {
    config: Arc<AppConfig>,
}

impl ApiClient {
    fn describe(&self) -> String {
        format!("ApiClient -> {}", self.config.endpoint)
    }
}

service_token! {
    static APP_CONFIG: AppConfig = "app_config";
    static API_CLIENT: ApiClient = "api_client";
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let container = ServiceContainer::new();

    // 注册单例配置
    container.register_singleton(&APP_CONFIG, |_| {
        Ok(AppConfig {
            endpoint: "http://localhost:8080".to_string(),
        })
    })?;

    // 客户端通过工厂注入解析自己的依赖
    container.register(&API_CLIENT, Lifetime::Transient, |resolver| {
        let config = resolver.resolve(&APP_CONFIG)?;
        Ok(ApiClient { config })
    })?;

    let client = container.resolve(&API_CLIENT)?;
    println!("{}", client.describe());

    let stats = container.stats();
    println!(
        "resolutions: {}, registered services: {}",
        stats.total_resolutions, stats.registered_services
    );

    Ok(())
}
