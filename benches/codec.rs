use bytes::Bytes;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use spheric::events::{StreamingMask, decode_event, ids};
use spheric::protocol::{SOP2_EVENT, checksum, decode, encode, encode_with_marker};
use spheric::{FrameDecoder, Options};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    // Roll command (4 bytes)
    let roll = [0xFF, 0x00, 0xB4, 0x01];
    group.throughput(Throughput::Bytes(4));
    group.bench_function("encode_roll", |b| {
        b.iter(|| {
            black_box(encode(0x02, 0x30, black_box(7), &roll, Options::all()).unwrap());
        });
    });

    // Largest payload (254 bytes)
    let large = vec![0xA5u8; 254];
    group.throughput(Throughput::Bytes(254));
    group.bench_function("encode_254b", |b| {
        b.iter(|| {
            black_box(encode(0x02, 0x52, 1, &large, Options::all()).unwrap());
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let roll = Bytes::from(encode(0x02, 0x30, 7, &[0xFF, 0x00, 0xB4, 0x01], Options::all()).unwrap());
    group.throughput(Throughput::Bytes(roll.len() as u64));
    group.bench_function("decode_roll", |b| {
        b.iter(|| {
            black_box(decode(roll.clone()).unwrap());
        });
    });

    let large = Bytes::from(encode(0x02, 0x52, 1, &[0xA5u8; 254], Options::all()).unwrap());
    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("decode_254b", |b| {
        b.iter(|| {
            black_box(decode(large.clone()).unwrap());
        });
    });

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    let data = vec![0x5Au8; 256];
    group.throughput(Throughput::Bytes(256));
    group.bench_function("sum_256b", |b| {
        b.iter(|| black_box(checksum(black_box(&data))));
    });
    group.finish();
}

fn bench_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream");

    // 64 small frames arriving in 13-byte chunks
    let mut wire = Vec::new();
    for sequence in 0..64u8 {
        wire.extend(encode(0x02, 0x30, sequence, &[0x80, 0x00, 0x5A, 0x01], Options::all()).unwrap());
    }
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("reassemble_chunked", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut frames = 0;
            for chunk in wire.chunks(13) {
                decoder.push(chunk);
                while let Some(frame) = decoder.next_frame() {
                    black_box(frame.unwrap());
                    frames += 1;
                }
            }
            assert_eq!(frames, 64);
        });
    });

    group.finish();
}

fn bench_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("events");

    let collision = encode_with_marker(SOP2_EVENT, ids::COLLISION, 0, 0, &[0x11; 16]).unwrap();
    let collision = decode(Bytes::from(collision)).unwrap();
    group.bench_function("decode_collision", |b| {
        b.iter(|| black_box(decode_event(&collision, StreamingMask::NONE).unwrap()));
    });

    let mask = StreamingMask::IMU_ANGLES | StreamingMask::ACCELEROMETER | StreamingMask::QUATERNION;
    let samples = vec![0x01u8; mask.sample_size() * 4];
    let streaming = encode_with_marker(SOP2_EVENT, ids::DATA_STREAMING, 0, 0, &samples).unwrap();
    let streaming = decode(Bytes::from(streaming)).unwrap();
    group.bench_function("decode_streaming_4_samples", |b| {
        b.iter(|| black_box(decode_event(&streaming, mask).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_checksum,
    bench_stream,
    bench_events
);
criterion_main!(benches);
