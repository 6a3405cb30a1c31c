//! Benchmarks for document compilation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use devprivops::document::Value;
use devprivops::graph::compile::{AnonIds, Compiler};
use devprivops::graph::insert::insert_data;
use devprivops::graph::iri::AbbreviationTable;

/// A data-flow description with `n` processes, each with two flows.
fn description(n: usize) -> String {
    let mut yaml = String::from("processes:\n");
    for i in 0..n {
        yaml.push_str(&format!(
            "  - id: p{i}\n    name: Process {i}\n    port: {i}\n    public: false\n    flows:\n      \
             - to: :store{i}\n        data: [email, name]\n      \
             - to: ot:partner\n        retention: 30\n"
        ));
    }
    yaml
}

fn table() -> AbbreviationTable {
    AbbreviationTable::new()
        .with_entry("ex", "https://example.com", &["^descriptions/"])
        .and_then(|t| t.with_entry("ot", "https://other.org", &[]))
        .unwrap()
}

fn bench_compile(c: &mut Criterion) {
    let table = table();
    let doc = Value::from_yaml_str(&description(500), "bench.yml").unwrap();
    let compiler = Compiler::for_file(&table, "descriptions/bench.yml").unwrap();
    let root = compiler.root();

    c.bench_function("compile_500_processes", |bench| {
        bench.iter(|| {
            black_box(
                compiler
                    .compile(black_box(&doc), &root, &mut AnonIds::new())
                    .unwrap(),
            )
        })
    });
}

fn bench_parse(c: &mut Criterion) {
    let text = description(500);
    c.bench_function("parse_500_processes", |bench| {
        bench.iter(|| black_box(Value::from_yaml_str(black_box(&text), "bench.yml").unwrap()))
    });
}

fn bench_insert_data(c: &mut Criterion) {
    let table = table();
    let doc = Value::from_yaml_str(&description(500), "bench.yml").unwrap();
    let compiler = Compiler::for_file(&table, "descriptions/bench.yml").unwrap();
    let triples = compiler
        .compile(&doc, &compiler.root(), &mut AnonIds::new())
        .unwrap();

    c.bench_function("insert_data_500_processes", |bench| {
        bench.iter(|| black_box(insert_data(black_box(&triples), &table)))
    });
}

criterion_group!(benches, bench_compile, bench_parse, bench_insert_data);
criterion_main!(benches);
