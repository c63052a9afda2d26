#![allow(unused)]
extern crate typeforge;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::{hint::black_box, sync::Arc};
use typeforge::prelude::*;

struct Greeter;

impl Participant for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn participate(
        &self,
        _state: &mut ParticipantState,
        context: &mut ProxyTypeAssemblyContext<'_>,
    ) -> Result<()> {
        let greet = context.requested_type().method("Greet")?;
        let proxy = context.proxy_mut()?;
        let (method, _) = proxy.get_or_add_override(&greet)?;
        proxy.set_method_body(method, Expr::constant("bench"))
    }
}

fn setup() -> (Pipeline, TypeRc) {
    let registry = Arc::new(TypeRegistry::new().unwrap());
    let base = ClassBuilder::new("Bench", "Base")
        .public()
        .default_constructor()
        .method("Greet", |m| {
            m.virtual_()
                .returns(TypeSignature::String)
                .body(Expr::constant("base"))
        })
        .build(&registry)
        .unwrap();
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Greeter))
        .build()
        .unwrap();
    (pipeline, base)
}

/// Benchmark a cold request: participants run and the batch is generated
fn bench_generate(c: &mut Criterion) {
    c.bench_function("pipeline_generate_proxy", |b| {
        b.iter_batched(
            setup,
            |(pipeline, base)| {
                let generated = pipeline.reflection_service().get_assembled_type(&base).unwrap();
                black_box(generated)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark cached lookups and instance creation through a cached constructor delegate
fn bench_cached(c: &mut Criterion) {
    let (pipeline, base) = setup();
    pipeline.create(&base, &[]).unwrap();

    c.bench_function("pipeline_cached_type", |b| {
        b.iter(|| {
            let generated = pipeline
                .reflection_service()
                .get_assembled_type(black_box(&base))
                .unwrap();
            black_box(generated)
        });
    });

    c.bench_function("pipeline_create_instance", |b| {
        b.iter(|| {
            let instance = pipeline.create(black_box(&base), &[]).unwrap();
            black_box(instance)
        });
    });
}

criterion_group!(benches, bench_generate, bench_cached);
criterion_main!(benches);
