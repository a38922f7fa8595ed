//! Scheduler throughput benchmarks.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use eventum_core::{Environment, Value};

fn bench_timeout_churn(c: &mut Criterion) {
    c.bench_function("schedule_and_drain_10k_timeouts", |b| {
        b.iter_batched(
            || {
                let env = Environment::new();
                for i in 0..10_000 {
                    let _ = env.timeout(f64::from(i % 97));
                }
                env
            },
            |env| env.run_until_idle().unwrap(),
            BatchSize::SmallInput,
        );
    });
}

fn bench_process_round_trips(c: &mut Criterion) {
    c.bench_function("1k_processes_3_hops_each", |b| {
        b.iter_batched(
            || {
                let env = Environment::new();
                for _ in 0..1_000 {
                    env.process(|ctx| async move {
                        ctx.sleep(1.0).await?;
                        ctx.sleep(1.0).await?;
                        ctx.sleep(1.0).await?;
                        Ok(Value::unit())
                    });
                }
                env
            },
            |env| env.run_until_idle().unwrap(),
            BatchSize::SmallInput,
        );
    });
}

fn bench_condition_fanin(c: &mut Criterion) {
    c.bench_function("all_of_512_timeouts", |b| {
        b.iter_batched(
            || {
                let env = Environment::new();
                let children: Vec<_> =
                    (0..512).map(|i| env.timeout(f64::from(i))).collect();
                let cond = env.all_of(children);
                (env, cond)
            },
            |(env, cond)| env.run(&cond).unwrap(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_timeout_churn,
    bench_process_round_trips,
    bench_condition_fanin
);
criterion_main!(benches);
