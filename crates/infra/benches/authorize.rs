use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use accessgate_auth::{AssignmentSource, NewPrincipal};
use accessgate_core::{PermissionId, PrincipalId, RoleId, SystemClock};
use accessgate_events::{BusPublisher, EventEnvelope, InMemoryEventBus, Notification};
use accessgate_infra::audit::InMemoryAuditLog;
use accessgate_infra::seed::{apply_catalog, bootstrap_admin, default_catalog};
use accessgate_infra::store::Stores;
use accessgate_infra::{AccessEngine, EngineConfig, OperationContext};

fn seeded_engine(principals: usize) -> AccessEngine {
    let bus: Arc<InMemoryEventBus<EventEnvelope<Notification>>> = Arc::new(InMemoryEventBus::new());
    let engine = AccessEngine::new(
        EngineConfig::default(),
        Stores::in_memory(),
        Arc::new(SystemClock),
        Arc::new(InMemoryAuditLog::new()),
        Arc::new(BusPublisher::new(bus)),
    );

    let ctx = OperationContext::system();
    apply_catalog(&engine, &ctx, default_catalog()).unwrap();
    bootstrap_admin(&engine, &ctx, NewPrincipal::new("admin", "Administrator")).unwrap();

    let roles = ["ROLE_USER", "ROLE_HR_VIEWER", "ROLE_FINANCE_MANAGER"];
    for n in 0..principals {
        let id = PrincipalId::new(format!("user{n:05}"));
        engine
            .create_principal(&ctx, NewPrincipal::new(id.clone(), format!("User {n}")))
            .unwrap();
        engine
            .assign(&ctx, &id, &RoleId::new(roles[n % roles.len()]), None, AssignmentSource::Manual)
            .unwrap();
    }
    engine
}

fn bench_authorize(c: &mut Criterion) {
    let engine = seeded_engine(100);
    let ctx = OperationContext::new("bench");
    let granted = PermissionId::new("USER_READ");
    let denied = PermissionId::new("SYSTEM_CONFIG");
    let principal = PrincipalId::new("user00000");

    let mut group = c.benchmark_group("authorize");
    group.throughput(Throughput::Elements(1));

    group.bench_function("granted", |b| {
        b.iter(|| {
            black_box(engine.authorize(&ctx, &principal, &granted, engine.now()).unwrap());
        });
    });

    group.bench_function("denied", |b| {
        b.iter(|| {
            black_box(engine.authorize(&ctx, &principal, &denied, engine.now()).unwrap());
        });
    });

    group.bench_function("admin_wide_role", |b| {
        let admin = PrincipalId::new("admin");
        b.iter(|| {
            black_box(engine.authorize(&ctx, &admin, &denied, engine.now()).unwrap());
        });
    });

    group.finish();
}

fn bench_effective_permissions(c: &mut Criterion) {
    let mut group = c.benchmark_group("effective_permissions");

    for principals in [10, 100, 1000] {
        let engine = seeded_engine(principals);
        let last = PrincipalId::new(format!("user{:05}", principals - 1));
        group.bench_with_input(BenchmarkId::from_parameter(principals), &last, |b, id| {
            b.iter(|| black_box(engine.effective_permissions_for(id, engine.now()).unwrap()));
        });
    }

    group.finish();
}

fn bench_explain(c: &mut Criterion) {
    let engine = seeded_engine(100);
    let principal = PrincipalId::new("user00001");
    let permission = PermissionId::new("HR_PAYROLL");

    c.bench_function("explain_denial", |b| {
        b.iter(|| black_box(engine.explain(&principal, &permission, engine.now()).unwrap()));
    });
}

criterion_group!(benches, bench_authorize, bench_effective_permissions, bench_explain);
criterion_main!(benches);
