//! # Mesh Gateway Benchmarks
//!
//! | Path | Operation |
//! |------|-----------|
//! | Registry | Resolve a route among many services |
//! | Tracker | Register and complete a pending request |
//! | Correlation | Generate a correlation id |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mesh_gateway::domain::{Channel, CompletionSource, EndpointPattern, PendingRequest, RouteKey};
use mesh_gateway::{
    CorrelationId, GatewayResponse, PendingRequestTracker, ServiceDescriptor, ServiceRegistry,
};
use tokio::sync::oneshot;

fn descriptor(n: usize) -> ServiceDescriptor {
    ServiceDescriptor {
        id: format!("svc-{n}"),
        name: format!("svc-{n}"),
        supported_channels: [Channel::Bus].into_iter().collect(),
        hostname: None,
        port: None,
        endpoints: vec![
            EndpointPattern::parse(&format!("GET /svc-{n}/items/:id")),
            EndpointPattern::parse(&format!("POST /svc-{n}/items")),
        ],
        commands: vec![],
        instances: vec![],
    }
}

fn bench_registry_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for size in [10, 100, 1000] {
        let registry = ServiceRegistry::new();
        for n in 0..size {
            registry.update(descriptor(n));
        }
        let path = format!("/svc-{}/items/42", size - 1);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("resolve_last", size), &path, |b, path| {
            b.iter(|| black_box(registry.resolve("GET", path)))
        });
    }

    group.finish();
}

fn bench_tracker(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker");
    let tracker = PendingRequestTracker::new();
    let route = RouteKey::new("GET", "/orders");

    group.bench_function("add_then_complete", |b| {
        b.iter(|| {
            let (tx, _rx) = oneshot::channel::<GatewayResponse>();
            let id = CorrelationId::generate(&route);
            let request = PendingRequest::new(route.clone(), Channel::Bus, "orders", Box::new(tx));
            tracker.add(id.clone(), request);
            black_box(tracker.complete(
                id.as_str(),
                GatewayResponse::not_found(),
                CompletionSource::Bus,
            ))
        })
    });

    group.bench_function("correlation_id", |b| {
        b.iter(|| black_box(CorrelationId::generate(&route)))
    });

    group.finish();
}

criterion_group!(benches, bench_registry_resolve, bench_tracker);
criterion_main!(benches);
