use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use pid_harness::control::{
    function::{CatalogBinder, FunctionBinder, FEEDBACK_SIGNATURE, GENERATOR_SIGNATURE},
    pid::{self, Controller, PidController},
    scheduler::LoopDriver,
};
use pid_harness::settings::values::{OutputRange, SignalParameters, Tuning};

fn settings() -> (Tuning, OutputRange) {
    let tuning = Tuning::new(1.2, 0.8, 0.05, 20.0, false, false).unwrap();
    (tuning, OutputRange::new(1.0, -1.0).unwrap())
}

fn pid_step_bench(c: &mut Criterion) {
    let (tuning, range) = settings();
    let mut controller = PidController::with_settings(tuning, range);
    let mut measurement = 0.0;

    c.bench_function("pid_step", |b| {
        b.iter(|| {
            measurement = controller.step(black_box(1.0), black_box(measurement), 10);
        })
    });
}

fn loop_tick_bench(c: &mut Criterion) {
    let (tuning, range) = settings();
    let controller = pid::shared(PidController::with_settings(tuning, range));
    let binder = CatalogBinder::new();
    let generator = binder.bind("sine", &GENERATOR_SIGNATURE).unwrap();
    let feedback = binder.bind("first_order_lag", &FEEDBACK_SIGNATURE).unwrap();
    let mut driver = LoopDriver::new(SignalParameters::new(0, 10, 0.0, 1.0).unwrap());

    c.bench_function("loop_tick_sine_lag", |b| {
        b.iter(|| {
            black_box(driver.tick(&generator, &feedback, &controller).unwrap());
        })
    });
}

criterion_group!(benches, pid_step_bench, loop_tick_bench);
criterion_main!(benches);
