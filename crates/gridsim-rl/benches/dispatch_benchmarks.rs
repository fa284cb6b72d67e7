//! Dispatch Benchmarks
//!
//! Hot paths of an evaluation run:
//! 1. DispatchSimulator::dispatch() - once per step
//! 2. RewardModel::score() - once per step
//! 3. GreedyPolicy::act() - once per step for the reference baseline
//! 4. run_episode() - a full 168-step episode

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gridsim_core::{Action, BelowMinPolicy, DemandSeries, GridSimConfig, RewardConfig};
use gridsim_rl::{
    run_episode, DispatchEnv, DispatchSimulator, GreedyPolicy, Policy, RandomPolicy, RewardModel,
};

fn bench_step(c: &mut Criterion) {
    let config = GridSimConfig::default();
    let generators: Arc<[_]> = config.generators.clone().into();
    let sim = DispatchSimulator::new(generators.clone(), BelowMinPolicy::ClampToMin);
    let model = RewardModel::new(generators, RewardConfig::default());
    let state = sim.initial_state(config.environment.initial_output);
    let action = Action::new(vec![0.5, -0.25, 1.0, -1.0, 0.1]);

    let mut group = c.benchmark_group("step");
    group.throughput(Throughput::Elements(1));

    group.bench_function("dispatch", |b| {
        b.iter(|| sim.dispatch(black_box(&state), black_box(&action), 500.0));
    });

    let (next, _, _) = sim.dispatch(&state, &action, 500.0).unwrap();
    group.bench_function("score", |b| {
        b.iter(|| model.score(black_box(&state), &action, black_box(&next), 500.0));
    });

    group.finish();
}

fn bench_policies(c: &mut Criterion) {
    let config = GridSimConfig::default();
    let series = Arc::new(DemandSeries::constant(500.0, 400).unwrap());
    let mut env = DispatchEnv::new(&config, series).unwrap();
    let observation = env.reset(0).unwrap();

    let mut group = c.benchmark_group("act");
    let mut greedy = GreedyPolicy::new(config.generators.clone().into());
    group.bench_function("greedy", |b| {
        b.iter(|| greedy.act(black_box(&observation)));
    });
    let mut random = RandomPolicy::new(0);
    group.bench_function("random", |b| {
        b.iter(|| random.act(black_box(&observation)));
    });
    group.finish();
}

fn bench_episode(c: &mut Criterion) {
    let config = GridSimConfig::default();
    let series = Arc::new(config.demand.synthetic.generate().unwrap());

    let mut group = c.benchmark_group("episode");
    for horizon in [24usize, 168] {
        let mut config = config.clone();
        config.environment.horizon = horizon;
        let mut env = DispatchEnv::new(&config, series.clone()).unwrap();
        let mut policy = GreedyPolicy::new(config.generators.clone().into());

        group.throughput(Throughput::Elements(horizon as u64));
        group.bench_with_input(BenchmarkId::new("greedy", horizon), &horizon, |b, _| {
            let mut seed = 0;
            b.iter(|| {
                seed += 1;
                run_episode(&mut env, &mut policy, seed, 0.03)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_step, bench_policies, bench_episode);
criterion_main!(benches);
