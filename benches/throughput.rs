//! Throughput benchmarks for the decode -> I2S pipeline.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flashplay::config::{I2sConfig, PipelineConfig};
use flashplay::element::Element;
use flashplay::elements::{DecoderElement, I2sWriter, RawPcmDecoder};
use flashplay::format::MusicInfo;
use flashplay::io::AssetStream;
use flashplay::output::NullOutput;
use flashplay::pipeline::Pipeline;
use std::hint::black_box;

const STREAM_BYTES: usize = 1 << 20;

fn build(frame_bytes: usize, capacity: usize) -> Pipeline {
    let decoder = RawPcmDecoder::new(MusicInfo::cd(), frame_bytes).unwrap();
    let mut dec = Element::new("dec", DecoderElement::new(decoder));
    dec.set_read_source(AssetStream::new(vec![0u8; STREAM_BYTES]));

    let i2s_config = I2sConfig {
        buffer_len: frame_bytes,
        ..I2sConfig::default()
    };
    let i2s = Element::new("i2s", I2sWriter::new(i2s_config, NullOutput::new()).unwrap());

    let mut pipeline = Pipeline::new(PipelineConfig::with_link_capacity(capacity));
    pipeline.register(dec, "dec").unwrap();
    pipeline.register(i2s, "i2s").unwrap();
    pipeline.link(&["dec", "i2s"]).unwrap();
    pipeline
}

/// Benchmark a full run over 1 MiB of PCM at different frame sizes.
fn bench_frame_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_frame_size");
    group.throughput(Throughput::Bytes(STREAM_BYTES as u64));

    for frame_bytes in [512usize, 4096, 16384] {
        group.bench_with_input(
            BenchmarkId::from_parameter(frame_bytes),
            &frame_bytes,
            |b, &frame_bytes| {
                b.iter_batched(
                    || build(frame_bytes, 8),
                    |mut pipeline| {
                        pipeline.run().unwrap();
                        pipeline.wait_for_stop().unwrap();
                        black_box(pipeline.state())
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark how link depth affects the same run.
fn bench_link_capacity(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_link_capacity");
    group.throughput(Throughput::Bytes(STREAM_BYTES as u64));

    for capacity in [1usize, 4, 32] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.iter_batched(
                    || build(4096, capacity),
                    |mut pipeline| {
                        pipeline.run().unwrap();
                        pipeline.wait_for_stop().unwrap();
                        black_box(pipeline.state())
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_frame_size, bench_link_capacity);
criterion_main!(benches);
