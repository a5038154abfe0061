use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use echo_server::http::InboundRequest;
use echo_server::push::EventStreamCodec;
use echo_server::{EchoPayload, EventSequencer};
use tokio_util::codec::Encoder;

fn request(body_len: usize) -> InboundRequest {
    let body = "x".repeat(body_len);
    let raw = format!(
        "POST /orders?id=7 HTTP/1.1\r\nHost: echo\r\nUser-Agent: bench\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    InboundRequest::parse(raw.as_bytes(), "127.0.0.1:9000".parse().unwrap()).unwrap()
}

fn bench_payload_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_render");

    for size in [0, 256, 4096, 65536] {
        let request = request(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("echo_payload", size), &request, |b, request| {
            b.iter(|| black_box(EchoPayload::render(request)))
        });
    }

    group.finish();
}

fn bench_event_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_encoding");
    let data = EchoPayload::render(&request(256)).into_string();

    for chunked in [false, true] {
        group.bench_with_input(
            BenchmarkId::new("request_event", if chunked { "chunked" } else { "plain" }),
            &chunked,
            |b, &chunked| {
                let mut codec = EventStreamCodec::new(chunked);
                let mut dst = BytesMut::with_capacity(4096);
                let mut sequencer = EventSequencer::new();
                b.iter(|| {
                    dst.clear();
                    let event = sequencer.next_event("request", data.clone());
                    codec.encode(event, &mut dst).unwrap();
                    black_box(dst.len())
                })
            },
        );
    }

    group.bench_function("heartbeat_event", |b| {
        let mut sequencer = EventSequencer::new();
        b.iter(|| black_box(sequencer.next_event("time", "2024-01-01T00:00:00Z").encode()))
    });

    group.finish();
}

criterion_group!(benches, bench_payload_render, bench_event_encoding);
criterion_main!(benches);
