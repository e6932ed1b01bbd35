//! Benchmarks for the OPL synthesis hot path
//!
//! Run with: cargo bench --bench chip -p opl

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use opl::{Frame, Opl3, OplBackend, OplConfig, OplDevice};
use std::hint::black_box;

/// Key a plain FM voice on `channel` of bank 0
fn key_voice(chip: &mut Opl3, channel: u16) {
    let offset = (channel / 3) * 8 + channel % 3;
    chip.write_register(0x20 + offset, 0x01);
    chip.write_register(0x40 + offset, 0x10);
    chip.write_register(0x60 + offset, 0xf4);
    chip.write_register(0x23 + offset, 0x01);
    chip.write_register(0x63 + offset, 0xf4);
    chip.write_register(0xc0 + channel, 0x3e);
    chip.write_register(0xa0 + channel, 0x44);
    chip.write_register(0xb0 + channel, 0x32);
}

fn bench_generate_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_frames");

    let mut chip = Opl3::new(49716);
    chip.write_register(0x105, 0x01);
    for channel in 0..9 {
        key_voice(&mut chip, channel);
    }

    for frame_count in [512, 4096, 49716].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(frame_count),
            frame_count,
            |b, &frame_count| {
                b.iter(|| {
                    black_box(chip.generate_frames(frame_count));
                });
            },
        );
    }

    group.finish();
}

fn bench_silent_chip(c: &mut Criterion) {
    let mut chip = Opl3::new(49716);
    let mut buffer = vec![Frame::default(); 4096];

    c.bench_function("silent_4096_frames", |b| {
        b.iter(|| {
            chip.generate_frames_into(black_box(&mut buffer));
        });
    });
}

fn bench_rhythm(c: &mut Criterion) {
    let mut chip = Opl3::new(49716);
    // operators of channels 6-8
    for offset in 0x10u16..=0x15 {
        chip.write_register(0x60 + offset, 0xf6);
        chip.write_register(0x80 + offset, 0x46);
    }
    chip.write_register(0xbd, 0x3f);

    c.bench_function("rhythm_1000_frames", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                black_box(chip.generate_frame());
            }
        });
    });
}

fn bench_register_updates(c: &mut Criterion) {
    let mut chip = Opl3::new(49716);

    c.bench_function("write_register", |b| {
        b.iter(|| {
            chip.write_register(black_box(0xa0), black_box(0x44));
            chip.write_register(black_box(0xb0), black_box(0x32));
            chip.write_register(black_box(0x40), black_box(0x10));
            chip.write_register(black_box(0xb0), black_box(0x12));
        });
    });
}

fn bench_device_port_path(c: &mut Criterion) {
    let mut device = match OplDevice::new(OplConfig::default()) {
        Ok(device) => device,
        Err(e) => panic!("device setup failed: {e}"),
    };
    let mut now = 0.0;

    c.bench_function("port_writes_with_render", |b| {
        b.iter(|| {
            now += 1.0;
            device.port_write(0x388, 0xb0, now);
            device.port_write(0x389, black_box(0x32), now);
            black_box(device.audio_callback(64, now));
        });
    });
}

criterion_group!(
    benches,
    bench_generate_frames,
    bench_silent_chip,
    bench_rhythm,
    bench_register_updates,
    bench_device_port_path
);
criterion_main!(benches);
