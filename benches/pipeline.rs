use criterion::{criterion_group, criterion_main, Criterion};
use sonichue::audio::{AnalysisWindow, FFT_SIZE};
use sonichue::{Color, ColorMapper, PitchEstimator, SpectrumSampler};
use std::hint::black_box;

fn tone_window() -> AnalysisWindow {
    let samples: Vec<f32> = (0..FFT_SIZE)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
        .collect();
    let mut window = AnalysisWindow::new();
    window.push(&samples);
    window
}

fn bench_frame(c: &mut Criterion) {
    let window = tone_window();

    c.benchmark_group("frame")
        .bench_function("frequency_snapshot", |b| {
            let mut sampler = SpectrumSampler::default();
            b.iter(|| black_box(sampler.frequency_snapshot(&window)));
        })
        .bench_function("pitch_estimate", |b| {
            let sampler = SpectrumSampler::default();
            let time = sampler.time_snapshot(&window);
            let mut estimator = PitchEstimator::default();
            b.iter(|| black_box(estimator.estimate(&time, 44100).unwrap()));
        })
        .bench_function("full_tick_without_tempo", |b| {
            let mut sampler = SpectrumSampler::default();
            let mut estimator = PitchEstimator::default();
            let mapper = ColorMapper::default();
            let mut color = Color::new(0.5, 0.5, 0.5);

            b.iter(|| {
                let freq = sampler.frequency_snapshot(&window);
                let time = sampler.time_snapshot(&window);
                let loudness = sonichue::estimate_loudness(&freq).unwrap();
                let pitch = estimator.estimate(&time, 44100).unwrap();
                color = mapper.next(&color, pitch);
                black_box((loudness, color))
            });
        });
}

criterion_group!(benches, bench_frame);
criterion_main!(benches);
