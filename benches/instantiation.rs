//! Compile-once / instantiate-many benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use amsel::Interface;

const UNIT: &str = r#"
Window:
  Caption: "Bench"
  children:
    - Stack:
        Orientation: Vertical
        children:
          - TextBox: { Name: Input, Text: "start" }
          - Label: { Text: "{../Input.Text}" }
          - Slider: { Name: S, Value: "25" }
          - Label: { Text: "{../S.Value}" }
          - Button: { Caption: go, MouseClick: "{IsPressed=true}" }
"#;

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_unit", |b| {
        b.iter(|| {
            // fresh host so every iteration really compiles
            let iface = Interface::new();
            black_box(iface.compile_str("bench.aml.yaml", UNIT).unwrap())
        })
    });
}

fn bench_instantiate(c: &mut Criterion) {
    let iface = Interface::new();
    let unit = iface.compile_str("bench.aml.yaml", UNIT).unwrap();
    c.bench_function("instantiate_compiled_unit", |b| {
        b.iter(|| black_box(unit.instantiate(&iface).unwrap()))
    });
}

fn bench_binding_push(c: &mut Criterion) {
    let iface = Interface::new();
    let unit = iface.compile_str("bench.aml.yaml", UNIT).unwrap();
    let tree = unit.instantiate(&iface).unwrap();
    let input = tree.find_by_name("Input").unwrap();
    let mut n = 0u64;
    c.bench_function("binding_push", |b| {
        b.iter(|| {
            n += 1;
            input.set_value("Text", serde_json::json!(n.to_string()));
        })
    });
}

criterion_group!(benches, bench_compile, bench_instantiate, bench_binding_push);
criterion_main!(benches);
