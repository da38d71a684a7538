use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use simkern_core::model::sharing::{ConstraintInput, VariableInput, solve_max_min};
use simkern_core::platform::{Host, Link, NetZone, RoutingKind, SharingPolicy};
use simkern_core::{Activity, ActorCode, Engine, SimkernConfig};

/// `flows` variables crossing `links` shared constraints in a ring.
fn ring_system(links: usize, flows: usize) -> (Vec<ConstraintInput>, Vec<VariableInput>) {
    let constraints = (0..links)
        .map(|index| ConstraintInput {
            capacity: 1e8 * (1 + index % 3) as f64,
            policy: SharingPolicy::Shared,
        })
        .collect();
    let variables = (0..flows)
        .map(|index| VariableInput {
            penalty: 1.0 + (index % 4) as f64,
            bound: f64::INFINITY,
            usages: vec![(index % links, 1.0), ((index + 1) % links, 1.0)],
        })
        .collect();
    (constraints, variables)
}

fn bench_max_min_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_min_solver");
    for flows in [16, 128, 1024] {
        let (constraints, variables) = ring_system(flows / 4, flows);
        group.bench_with_input(BenchmarkId::from_parameter(flows), &flows, |b, _| {
            b.iter(|| solve_max_min(black_box(&constraints), black_box(&variables)));
        });
    }
    group.finish();
}

fn star_platform(workers: usize) -> NetZone {
    let mut zone = NetZone::new("star", RoutingKind::Full);
    zone.add_host(Host::new("master", 1e9));
    for index in 0..workers {
        let host = format!("worker-{index}");
        let link = format!("link-{index}");
        zone.add_host(Host::new(host.clone(), 1e9))
            .add_link(Link::new(link.clone(), 1.25e8, 1e-4))
            .add_route("master", &host, &[&link], true);
    }
    zone
}

/// Master/worker round: one task per worker through mailboxes, then compute.
fn run_master_worker(workers: usize) -> f64 {
    let engine = Engine::with_config(SimkernConfig::default()).unwrap();
    engine.load_platform(star_platform(workers)).unwrap();

    engine
        .create_actor(
            "master",
            "master",
            ActorCode::from_fn(move |ctx| async move {
                let mut pending = Vec::with_capacity(workers);
                for index in 0..workers {
                    pending.push(ctx.mailbox(format!("worker-{index}")).put_async(1e9_f64, 1e6)?);
                }
                for comm in pending {
                    comm.wait().await?;
                }
                Ok(())
            }),
        )
        .unwrap();
    for index in 0..workers {
        engine
            .create_actor(
                &format!("worker-{index}"),
                &format!("worker-{index}"),
                ActorCode::from_fn(move |ctx| async move {
                    let flops: f64 = ctx.mailbox(format!("worker-{index}")).get().await?;
                    ctx.execute(flops).await?;
                    Ok(())
                }),
            )
            .unwrap();
    }

    let report = engine.run().unwrap();
    Engine::shutdown();
    report.end_clock
}

fn bench_engine_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("master_worker");
    group.sample_size(20);
    for workers in [8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| run_master_worker(black_box(workers)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_max_min_solver, bench_engine_run);
criterion_main!(benches);
