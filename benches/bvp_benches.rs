use JefferyHamelRs::physics::jeffery_hamel::{solve_case, FlowConfig, FlowVariant};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_momentum_re50(c: &mut Criterion) {
    let config = FlowConfig::study().unwrap();
    c.bench_function("momentum Re=50", |b| {
        b.iter(|| solve_case(&config, FlowVariant::MomentumOnly, 50.0))
    });
}

fn bench_coupled_re5(c: &mut Criterion) {
    let config = FlowConfig::study().unwrap();
    c.bench_function("coupled (no dissipation) Re=5", |b| {
        b.iter(|| solve_case(&config, FlowVariant::CoupledNoDissipation, 5.0))
    });
}

criterion_group!(benches, bench_momentum_re50, bench_coupled_re5);
criterion_main!(benches);
