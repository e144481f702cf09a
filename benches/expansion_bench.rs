use criterion::{Criterion, criterion_group, criterion_main};
use indexmap::IndexMap;
use matrix_ci::core::config::parse_workflow;
use matrix_ci::core::planner::plan_execution;
use matrix_ci::matrix::{Attributes, Axis, MatrixSpec, expand};
use std::hint::black_box;

/// 4 axes x 6 values = 1296 combinations, with a handful of include and
/// exclude entries so every expansion stage does real work.
fn large_spec() -> MatrixSpec {
    let axes = ["os", "toolchain", "features", "target"]
        .iter()
        .map(|name| Axis::new(*name, (0..6).map(|i| format!("{name}-{i}"))))
        .collect();

    let entry = |pairs: &[(&str, &str)]| -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), (*v).into()))
            .collect::<IndexMap<_, _>>()
    };

    MatrixSpec {
        axes,
        include: vec![
            entry(&[("os", "os-0"), ("experimental", "true")]),
            entry(&[("os", "os-9"), ("toolchain", "toolchain-9")]),
        ],
        exclude: vec![
            entry(&[("os", "os-1"), ("target", "target-5")]),
            entry(&[("features", "features-3")]),
        ],
    }
}

fn bench_expand(c: &mut Criterion) {
    let spec = large_spec();
    c.bench_function("expand_1296", |b| b.iter(|| expand(black_box(&spec))));
}

fn bench_plan(c: &mut Criterion) {
    let workflow = parse_workflow(
        r#"
name = "bench"
runs_on = "${{ matrix.os }}"
[matrix]
os = ["linux", "mac", "windows"]
toolchain = ["stable", "beta", "nightly"]
features = ["default", "full", "minimal", "none"]
[[steps]]
name = "Test ${{ matrix.toolchain }}"
run = "cargo +${{ matrix.toolchain }} test --features ${{ matrix.features }}"
"#,
    )
    .unwrap();

    c.bench_function("plan_36_jobs", |b| {
        b.iter(|| plan_execution(black_box(&workflow), None))
    });
}

criterion_group!(benches, bench_expand, bench_plan);
criterion_main!(benches);
