//! 容器解析与模块装载的性能基准测试

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modkit::{load, LoadOptions, Module, ModuleRef, ServiceContainer, ServiceToken};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// 测试用的简单服务
#[derive(Clone)]
struct SimpleService {
    value: i32,
}

/// 基准测试：单例解析（缓存命中路径）
fn bench_singleton_resolution(c: &mut Criterion) {
    let container = ServiceContainer::new();
    let token = ServiceToken::<SimpleService>::new("simple");
    container
        .register_singleton(&token, |_| Ok(SimpleService { value: 42 }))
        .unwrap();
    // 预热缓存
    let _ = container.resolve(&token).unwrap();

    c.bench_function("singleton_resolution_hit", |b| {
        b.iter(|| {
            let service = container.resolve(black_box(&token)).unwrap();
            black_box(service.value)
        })
    });
}

/// 基准测试：瞬态解析（每次都走工厂）
fn bench_transient_resolution(c: &mut Criterion) {
    let container = ServiceContainer::new();
    let token = ServiceToken::<SimpleService>::new("simple");
    container
        .register_transient(&token, |_| Ok(SimpleService { value: 42 }))
        .unwrap();

    c.bench_function("transient_resolution", |b| {
        b.iter(|| {
            let service = container.resolve(black_box(&token)).unwrap();
            black_box(service.value)
        })
    });
}

/// 基准测试：作用域创建加解析
fn bench_scope_creation(c: &mut Criterion) {
    let container = ServiceContainer::new();
    let token = ServiceToken::<SimpleService>::new("scoped");
    container
        .register_scoped(&token, |_| Ok(SimpleService { value: 42 }))
        .unwrap();

    c.bench_function("scope_create_and_resolve", |b| {
        b.iter(|| {
            let scope = container.create_scope("bench");
            let service = scope.resolve(black_box(&token)).unwrap();
            black_box(service.value)
        })
    });
}

struct ChainModule {
    name: String,
    deps: Vec<ModuleRef>,
}

impl Module for ChainModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<ModuleRef> {
        self.deps.clone()
    }
}

/// 基准测试：不同规模模块链的完整装载
fn bench_module_load(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();

    let mut group = c.benchmark_group("module_load");
    for module_count in [1usize, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(module_count),
            module_count,
            |b, &module_count| {
                b.to_async(&runtime).iter(|| async move {
                    let mut previous: Option<ModuleRef> = None;
                    for i in 0..module_count {
                        let deps = previous.take().map(|p| vec![p]).unwrap_or_default();
                        previous = Some(Arc::new(ChainModule {
                            name: format!("m{}", i),
                            deps,
                        }));
                    }
                    let root = previous.unwrap();
                    let host = load(vec![root], LoadOptions::default()).await.unwrap();
                    black_box(host.module_phases().len())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_singleton_resolution,
    bench_transient_resolution,
    bench_scope_creation,
    bench_module_load
);
criterion_main!(benches);
