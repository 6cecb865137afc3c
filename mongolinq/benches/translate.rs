use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lazy_static::lazy_static;
use mongolinq::{
    expression::{builder::*, Expression, Type},
    logging::init_logger,
    options::TranslationOptions,
    serialization::{ClassMap, SerializerRegistry},
    translate_query, Translation,
};

lazy_static! {
    static ref REGISTRY: SerializerRegistry = {
        let registry = SerializerRegistry::new();
        registry.register_class_map(
            ClassMap::new("Order")
                .member("Id", Type::ObjectId)
                .member("Customer", Type::String)
                .member("Status", Type::String)
                .member("Total", Type::Double)
                .member("Items", Type::array(Type::Int32)),
        );
        registry
    };
}

fn grouped_totals() -> Expression {
    let o = param("o", Type::class("Order"));
    let i = param("i", Type::Int32);
    let k = param("k", Type::String);
    let g = param("g", Type::grouping(Type::String, Type::class("Order")));
    source("orders", Type::class("Order"))
        .where_(lambda(
            &o,
            and_also(
                eq(o.member("Status", Type::String), string("shipped")),
                o.member("Items", Type::array(Type::Int32))
                    .any_with(lambda(&i, gt(i.expr(), int(10)))),
            ),
        ))
        .group_by_result(
            lambda(&o, o.member("Customer", Type::String)),
            lambda_n(
                &[&k, &g],
                new_anonymous(vec![
                    ("Customer", k.expr()),
                    ("Orders", g.expr().count()),
                    ("First", g.expr().first()),
                ]),
            ),
        )
        .take(int(100))
}

fn translate(expr: &Expression) -> Translation {
    translate_query(expr, &REGISTRY, TranslationOptions::default()).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    init_logger();
    let query = grouped_totals();
    c.bench_function("translate_grouped_totals", |b| {
        b.iter(|| translate(black_box(&query)))
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = criterion_benchmark
);
criterion_main!(benches);
