use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use erm_core::field_map::Operation;
use erm_core::lexer::Lexer;
use erm_core::object::{Collection, Entity, EntityRef, Property, Record};
use erm_core::reflect::{CollectionKind, FieldMetaData, Reflector, StaticReflector};
use erm_core::serialization::{from_json, to_json};
use erm_core::typer::FieldType;
use erm_core::{compile, Marshaller};
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// Test Data: Varying Complexity and Size
// ============================================================================

const TINY_ERM: &str = "bench.Address { street }";

const SMALL_ERM: &str = "bench.Customer { (id), name, email, address: bench.Address { street, city } }";

const MEDIUM_ERM: &str = r#"
alias bench.Customer as Customer;
alias bench.Order as Order;

Customer {
    (id),
    [name],
    sensitive email,
    tier = "standard",
    credit = 0.00,
    address: optional bench.Address { street, city as town },
    orders: [eager Order] {
        (id),
        total,
        lines: [bench.Line] { sku, quantity = 1 }
    },
    tags: [String]
}"#;

const REFLECTED_ERM: &str = "<bench.Customer>";

fn reflector() -> StaticReflector {
    StaticReflector::new()
        .class("bench.Customer")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::simple("name", FieldType::String))
        .field(FieldMetaData::simple("email", FieldType::String))
        .field(FieldMetaData::simple("tier", FieldType::String))
        .field(FieldMetaData::simple("credit", FieldType::Decimal))
        .field(FieldMetaData::component("address", "bench.Address"))
        .field(FieldMetaData::one_to_many("orders", "bench.Order").orphan_delete())
        .field(FieldMetaData::values("tags", FieldType::String))
        .versioned()
        .done()
        .class("bench.Address")
        .field(FieldMetaData::simple("street", FieldType::String))
        .field(FieldMetaData::simple("city", FieldType::String))
        .done()
        .class("bench.Order")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::simple("total", FieldType::Decimal))
        .field(FieldMetaData::collection("lines", "bench.Line"))
        .done()
        .class("bench.Line")
        .field(FieldMetaData::simple("sku", FieldType::String))
        .field(FieldMetaData::simple("quantity", FieldType::Integer))
        .done()
}

// Generate a customer with many orders for stress testing
fn generate_customer(r: &StaticReflector, order_count: usize) -> EntityRef {
    let customer = r.instantiate("bench.Customer").unwrap();
    let orders = Rc::new(RefCell::new(Collection::new(CollectionKind::List)));
    for i in 0..order_count {
        let lines = Collection::from_items(
            CollectionKind::List,
            (0..3).map(|n| {
                Property::entity(
                    Record::new("bench.Line", ["sku", "quantity"])
                        .with("sku", format!("SKU-{}-{}", i, n))
                        .with("quantity", n as i64 + 1),
                )
            }),
        );
        let order = Record::new("bench.Order", ["id", "total", "lines"])
            .with("id", i as i64)
            .with("total", rust_decimal::Decimal::new(i as i64 * 100 + 99, 2))
            .with("lines", Property::Collection(Rc::new(RefCell::new(lines))));
        orders.borrow_mut().add(Property::entity(order));
    }
    {
        let mut c = customer.borrow_mut();
        c.set_property("id", Property::Int(1)).unwrap();
        c.set_property("name", Property::from("Bench Customer")).unwrap();
        c.set_property("email", Property::from("bench@example.com")).unwrap();
        c.set_property("orders", Property::Collection(orders)).unwrap();
    }
    customer
}

// ============================================================================
// Lexer Benchmarks
// ============================================================================

fn bench_lexer_tiny(c: &mut Criterion) {
    c.bench_function("lexer_tiny", |b| {
        b.iter(|| {
            let mut lexer = Lexer::new(black_box(TINY_ERM));
            lexer.lex()
        })
    });
}

fn bench_lexer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_by_size");

    for (name, source) in [("tiny", TINY_ERM), ("small", SMALL_ERM), ("medium", MEDIUM_ERM)] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, src| {
            b.iter(|| {
                let mut lexer = Lexer::new(black_box(src));
                lexer.lex()
            })
        });
    }
    group.finish();
}

// ============================================================================
// Compiler Benchmarks
// ============================================================================

fn bench_compile_sizes(c: &mut Criterion) {
    let r = reflector();
    let mut group = c.benchmark_group("compile_by_size");

    for (name, source) in [
        ("tiny", TINY_ERM),
        ("small", SMALL_ERM),
        ("medium", MEDIUM_ERM),
        ("reflected", REFLECTED_ERM),
    ] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, src| {
            b.iter(|| compile(black_box(src), None, &r))
        });
    }
    group.finish();
}

// ============================================================================
// Marshalling Benchmarks
// ============================================================================

fn bench_read_scaling(c: &mut Criterion) {
    let r = reflector();
    let mapper = compile(MEDIUM_ERM, None, &r).unwrap();
    let marshaller = Marshaller::new(&r);
    let mut group = c.benchmark_group("read_order_scaling");

    for size in [10, 100, 1000] {
        let customer = generate_customer(&r, size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &customer, |b, entity| {
            b.iter(|| marshaller.read(&mapper, black_box(entity)))
        });
    }
    group.finish();
}

fn bench_write_scaling(c: &mut Criterion) {
    let r = reflector();
    let mapper = compile(MEDIUM_ERM, None, &r).unwrap();
    let marshaller = Marshaller::new(&r);
    let mut group = c.benchmark_group("create_order_scaling");

    for size in [10, 100, 1000] {
        let doc = marshaller.read(&mapper, &generate_customer(&r, size)).unwrap();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &doc, |b, doc| {
            b.iter(|| marshaller.create(&mapper, black_box(doc.clone()), Operation::Create))
        });
    }
    group.finish();
}

fn bench_merge_in_place(c: &mut Criterion) {
    let r = reflector();
    let mapper = compile(MEDIUM_ERM, None, &r).unwrap();
    let marshaller = Marshaller::new(&r);
    let customer = generate_customer(&r, 100);
    let doc = marshaller.read(&mapper, &customer).unwrap();

    c.bench_function("merge_unchanged_100_orders", |b| {
        b.iter(|| marshaller.merge(&mapper, black_box(doc.clone()), &customer, Operation::Update))
    });
}

fn bench_json_round_trip(c: &mut Criterion) {
    let r = reflector();
    let mapper = compile(MEDIUM_ERM, None, &r).unwrap();
    let marshaller = Marshaller::new(&r);
    let customer = generate_customer(&r, 100);

    c.bench_function("json_round_trip_100_orders", |b| {
        b.iter(|| {
            let doc = marshaller.read(&mapper, black_box(&customer)).unwrap();
            let json = to_json(&doc).unwrap();
            let back = from_json(&json).unwrap();
            marshaller.create(&mapper, back, Operation::Create).map(|(entity, _)| entity)
        })
    });
}

criterion_group!(lexer_benches, bench_lexer_tiny, bench_lexer_sizes);
criterion_group!(compiler_benches, bench_compile_sizes);
criterion_group!(
    marshal_benches,
    bench_read_scaling,
    bench_write_scaling,
    bench_merge_in_place,
    bench_json_round_trip
);
criterion_main!(lexer_benches, compiler_benches, marshal_benches);
