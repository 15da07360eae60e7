use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use mdns::cache::{spawn, CacheHandle, Family};
use mdns::wire::{ClassCode, Message, Question, Rdata, ResourceRecord, TypeCode};

#[allow(non_snake_case)]
fn bench__ingest__unique(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("ingest/unique");
    for size in [1, 100, 1000] {
        let message = make_message(size, 300);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter_batched(
                || (spawn(size), message.clone()),
                |(cache, message)| rt.block_on(cache.ingest(message, Family::Inet, 1)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__ingest__duplicate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("ingest/duplicate");
    for size in [1, 100, 1000] {
        let mut message = Message::empty(0);
        message.header.is_response = true;
        for _ in 0..size {
            message.answers.push(a_record("www.source.example.com", (1, 1, 1, 1)));
        }
        message.header.ancount = size as u16;

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter_batched(
                || (spawn(size), message.clone()),
                |(cache, message)| rt.block_on(cache.ingest(message, Family::Inet, 1)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__lookup__hit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("lookup/hit");
    for size in [1, 100, 1000] {
        let message = make_message(size, 300);
        let questions = question_names(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter_batched(
                || rt.block_on(build_cache(size, message)),
                |cache| {
                    for q in &questions {
                        rt.block_on(cache.lookup(vec![q.clone()], Family::Inet, 1));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__lookup__miss(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("lookup/miss");
    for size in [1, 100, 1000] {
        let message = make_message(size, 300);
        let question = Question {
            name: "name.which.is.unlikely.to.coincidentally.be.present".to_string(),
            qtype: TypeCode::A,
            qclass: ClassCode::IN,
            unicast_response: false,
        };

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter_batched(
                || rt.block_on(build_cache(size, message)),
                |cache| rt.block_on(cache.lookup(vec![question.clone()], Family::Inet, 1)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__withdraw_interface(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("withdraw_interface");
    for size in [1, 100, 1000] {
        let message = make_message(size, 300);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter_batched(
                || rt.block_on(build_cache(size, message)),
                |cache| rt.block_on(cache.withdraw_interface(Family::Inet, 1)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

async fn build_cache(size: usize, message: &Message) -> CacheHandle {
    let cache = spawn(size);
    cache.ingest(message.clone(), Family::Inet, 1).await;
    cache
}

fn make_message(size: usize, ttl: u32) -> Message {
    let mut message = Message::empty(0);
    message.header.is_response = true;
    for i in 0..size {
        message.answers.push(a_record_ttl(&format!("www-{}.source.example.com", i / 2), (1, 1, 1, 1), ttl));
        message.answers.push(cname_record_ttl(
            &format!("www-{}.source.example.com", i / 2),
            &format!("www-{}.target.example.com", i / 2),
            ttl,
        ));
    }
    message.header.ancount = message.answers.len() as u16;
    message
}

fn question_names(size: usize) -> Vec<Question> {
    (0..size)
        .map(|i| Question {
            name: format!("www-{}.source.example.com", i / 2),
            qtype: TypeCode::A,
            qclass: ClassCode::IN,
            unicast_response: false,
        })
        .collect()
}

fn a_record(name: &str, address: (u8, u8, u8, u8)) -> ResourceRecord {
    a_record_ttl(name, address, 300)
}

fn a_record_ttl(name: &str, address: (u8, u8, u8, u8), ttl: u32) -> ResourceRecord {
    ResourceRecord {
        name: name.to_string(),
        rclass: ClassCode::IN,
        cache_flush: false,
        ttl,
        rdata: Rdata::A { address },
    }
}

fn cname_record_ttl(name: &str, target_name: &str, ttl: u32) -> ResourceRecord {
    ResourceRecord {
        name: name.to_string(),
        rclass: ClassCode::IN,
        cache_flush: false,
        ttl,
        rdata: Rdata::CNAME {
            name: target_name.to_string(),
        },
    }
}

criterion_group!(
    benches,
    bench__ingest__unique,
    bench__ingest__duplicate,
    bench__lookup__hit,
    bench__lookup__miss,
    bench__withdraw_interface,
);
criterion_main!(benches);
