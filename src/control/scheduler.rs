//! scheduler.rs
//! Periodic signal calculation driving the control loop.
//!
//! Per tick (`t_ms = tick * sample_time`):
//!   setpoint = generator(t_ms)
//!   input    = feedback(setpoint, previous_output) * factor + offset
//!   output   = controller.step(setpoint, input, sample_time)
//! Ticks below `calculation_skip` advance the loop but are not recorded.
//!
//! - Real-time scheduling: a single thread, coarse wait on the stop channel then a
//!   SpinSleeper for the last stretch before each release.
//! - A tick always completes (generator → feedback → controller → buffer) before the
//!   next one; an overrun schedules the next tick immediately, never a catch-up burst.
//! - Stop is cooperative and only takes effect at a tick boundary.
//! - A failing tick stops the thread and reports a [`SchedulerFault`] over the fault channel.

use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::control::{
    function::{FunctionHandle, FunctionSlot},
    pid::SharedController,
};
use crate::error::SchedulerFault;
use crate::settings::values::SignalParameters;
use crate::utils::{metrics::SharedSchedulerMetrics, series::LiveSeriesBuffer};

/// Remaining wait handed to the spin sleeper instead of the channel timeout.
const SPIN_WINDOW: Duration = Duration::from_millis(2);
const SPIN_NATIVE_ACCURACY_NS: u32 = 100_000;

/// One recorded tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSample {
    pub timestamp: u64,
    pub setpoint: f64,
    pub input: f64,
    pub output: f64,
}

impl SignalSample {
    pub fn values(&self) -> [f64; 3] {
        [self.setpoint, self.input, self.output]
    }
}

/// Logical clock and loop memory of the signal calculation, independent of wall time.
#[derive(Debug, Clone)]
pub struct LoopDriver {
    params: SignalParameters,
    tick_index: u64,
    previous_output: f64,
}

impl LoopDriver {
    pub fn new(params: SignalParameters) -> Self {
        Self { params, tick_index: 0, previous_output: 0.0 }
    }

    pub fn params(&self) -> SignalParameters {
        self.params
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    pub fn previous_output(&self) -> f64 {
        self.previous_output
    }

    /// Runs one tick. Returns the sample to record, or `None` during warm-up.
    pub fn tick(
        &mut self,
        generator: &FunctionHandle,
        feedback: &FunctionHandle,
        controller: &SharedController,
    ) -> Result<Option<SignalSample>, SchedulerFault> {
        let tick = self.tick_index;
        let sample_time = self.params.sample_time_millis();
        let timestamp = tick.saturating_mul(sample_time);

        let setpoint = evaluate(generator, &[timestamp as f64], tick)?;
        let fed_back = evaluate(feedback, &[setpoint, self.previous_output], tick)?;
        let input = fed_back * self.params.factor() + self.params.offset();
        if !input.is_finite() {
            return Err(SchedulerFault {
                tick,
                message: format!(
                    "scaled feedback input is {} (feedback {} * factor {} + offset {})",
                    input,
                    fed_back,
                    self.params.factor(),
                    self.params.offset()
                ),
            });
        }

        let output = controller.lock().step(setpoint, input, sample_time);

        self.previous_output = output;
        self.tick_index += 1;

        if tick < self.params.calculation_skip() {
            return Ok(None);
        }
        Ok(Some(SignalSample { timestamp, setpoint, input, output }))
    }
}

fn evaluate(handle: &FunctionHandle, args: &[f64], tick: u64) -> Result<f64, SchedulerFault> {
    let slot = handle.signature().slot;
    let fault = |message: String| SchedulerFault { tick, message };

    match catch_unwind(AssertUnwindSafe(|| handle.call(args))) {
        Ok(Ok(value)) if value.is_finite() => Ok(value),
        Ok(Ok(value)) => Err(fault(format!(
            "{} function '{}' returned {}",
            slot,
            handle.name(),
            value
        ))),
        Ok(Err(message)) => Err(fault(format!(
            "{} function '{}' failed: {}",
            slot,
            handle.name(),
            message
        ))),
        Err(_) => Err(fault(format!("{} function '{}' panicked", slot, handle.name()))),
    }
}

/// Everything the scheduler thread needs for one run.
pub struct TickContext {
    pub driver: LoopDriver,
    pub controller: SharedController,
    pub generator: Arc<FunctionSlot>,
    pub feedback: Arc<FunctionSlot>,
    pub buffer: Arc<LiveSeriesBuffer>,
    pub faults: Sender<SchedulerFault>,
    pub metrics: SharedSchedulerMetrics,
}

/// Owns the scheduler thread. At most one run is active at a time.
pub struct SignalScheduler {
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<LoopDriver>>,
}

impl Default for SignalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalScheduler {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }

    /// True while the thread is ticking. Turns false on its own after a fault.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True from `start` until the thread has been joined by `stop`.
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, ctx: TickContext) -> io::Result<()> {
        if self.handle.is_some() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "scheduler already started"));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let running = self.running.clone();
        running.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name("signal-scheduler".to_string())
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    debug!("[Scheduler] running without raised priority: {:?}", e);
                }
                run_loop(ctx, running, stop_rx)
            });

        match spawned {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Requests a stop and waits for the in-flight tick to finish.
    /// Returns the loop state so a later run can resume the logical clock.
    pub fn stop(&mut self) -> Option<LoopDriver> {
        self.running.store(false, Ordering::Release);
        // Disconnecting wakes the thread from its wait.
        self.stop_tx.take();

        let handle = self.handle.take()?;
        match handle.join() {
            Ok(driver) => Some(driver),
            Err(_) => {
                error!("[Scheduler] thread panicked; loop state lost");
                None
            }
        }
    }
}

impl Drop for SignalScheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run_loop(mut ctx: TickContext, running: Arc<AtomicBool>, stop_rx: Receiver<()>) -> LoopDriver {
    let params = ctx.driver.params();
    let period = Duration::from_millis(params.sample_time_millis());
    let sleeper = SpinSleeper::new(SPIN_NATIVE_ACCURACY_NS).with_spin_strategy(SpinStrategy::YieldThread);

    info!(
        "[Scheduler] started at tick {} period={}ms skip={}",
        ctx.driver.tick_index(),
        params.sample_time_millis(),
        params.calculation_skip()
    );

    let mut next_release = Instant::now();

    while running.load(Ordering::Acquire) {
        // ====================================================================
        // Wait for the release of the next tick (stop requests land here)
        // ====================================================================
        if !wait_until(next_release, &stop_rx, &sleeper) {
            break;
        }

        let started = Instant::now();
        let jitter_us = started.saturating_duration_since(next_release).as_micros() as u64;

        // Handles are cloned per tick: a rebind only affects the next tick.
        let result = match (ctx.generator.current(), ctx.feedback.current()) {
            (Some(generator), Some(feedback)) => ctx.driver.tick(&generator, &feedback, &ctx.controller),
            _ => Err(SchedulerFault {
                tick: ctx.driver.tick_index(),
                message: "generator or feedback function is not bound".to_string(),
            }),
        };

        match result {
            Ok(sample) => {
                if let Some(s) = &sample {
                    ctx.buffer.append(s.timestamp, &s.values());
                }
                ctx.metrics.lock().record_tick(jitter_us, sample.is_some());
            }
            Err(fault) => {
                error!("[Scheduler] {}", fault);
                ctx.metrics.lock().record_fault();
                running.store(false, Ordering::Release);
                let _ = ctx.faults.try_send(fault);
                break;
            }
        }

        // ====================================================================
        // Overrun: schedule the next tick right away, no backlog
        // ====================================================================
        next_release += period;
        let now = Instant::now();
        if next_release < now {
            debug!(
                "[Scheduler] tick {} overran its period by {}us",
                ctx.driver.tick_index() - 1,
                now.duration_since(next_release).as_micros()
            );
            ctx.metrics.lock().record_overrun();
            next_release = now;
        }
    }

    running.store(false, Ordering::Release);
    info!("[Scheduler] stopped at tick {}", ctx.driver.tick_index());
    ctx.driver
}

/// Sleeps until `deadline`. Returns false if a stop was requested meanwhile.
fn wait_until(deadline: Instant, stop_rx: &Receiver<()>, sleeper: &SpinSleeper) -> bool {
    let now = Instant::now();
    if deadline > now {
        let coarse = (deadline - now).saturating_sub(SPIN_WINDOW);
        if !coarse.is_zero() {
            match stop_rx.recv_timeout(coarse) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        let now = Instant::now();
        if deadline > now {
            sleeper.sleep(deadline - now);
        }
    }

    match stop_rx.try_recv() {
        Err(TryRecvError::Empty) => true,
        Ok(()) | Err(TryRecvError::Disconnected) => {
            debug!("[Scheduler] stop requested at tick boundary");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::function::{FEEDBACK_SIGNATURE, GENERATOR_SIGNATURE};
    use crate::control::pid::{self, PidController};
    use crate::settings::values::{OutputRange, Tuning};

    fn generator(f: fn(f64) -> f64) -> FunctionHandle {
        FunctionHandle::new("test", GENERATOR_SIGNATURE, move |a| Ok(f(a[0])))
    }

    fn direct_feedback() -> FunctionHandle {
        FunctionHandle::new("direct", FEEDBACK_SIGNATURE, |a| Ok(a[1]))
    }

    fn integrating_controller() -> SharedController {
        let tuning = Tuning::new(0.5, 1.0, 0.0, 0.0, false, false).unwrap();
        let range = OutputRange::new(10.0, -10.0).unwrap();
        pid::shared(PidController::with_settings(tuning, range))
    }

    #[test]
    fn timestamps_follow_the_logical_clock() {
        let params = SignalParameters::new(0, 100, 0.0, 1.0).unwrap();
        let mut driver = LoopDriver::new(params);
        let controller = integrating_controller();
        let (g, f) = (generator(|_| 1.0), direct_feedback());

        let stamps: Vec<u64> = (0..5)
            .map(|_| driver.tick(&g, &f, &controller).unwrap().unwrap().timestamp)
            .collect();
        assert_eq!(stamps, vec![0, 100, 200, 300, 400]);
    }

    #[test]
    fn skipped_ticks_warm_up_the_controller() {
        let skip = 3;
        let skipped = SignalParameters::new(skip, 100, 0.0, 1.0).unwrap();
        let plain = SignalParameters::new(0, 100, 0.0, 1.0).unwrap();
        let (g, f) = (generator(|_| 1.0), direct_feedback());

        let warm_controller = integrating_controller();
        let mut warm = LoopDriver::new(skipped);
        let mut first = None;
        while first.is_none() {
            first = warm.tick(&g, &f, &warm_controller).unwrap();
        }
        let first = first.unwrap();
        assert_eq!(first.timestamp, skip * 100);

        let cold_controller = integrating_controller();
        let mut cold = LoopDriver::new(plain);
        let cold_first = cold.tick(&g, &f, &cold_controller).unwrap().unwrap();
        assert_ne!(first.output, cold_first.output);
    }

    #[test]
    fn factor_and_offset_scale_the_feedback() {
        let params = SignalParameters::new(0, 100, 0.5, 2.0).unwrap();
        let mut driver = LoopDriver::new(params);
        let controller = integrating_controller();
        let f = FunctionHandle::new("const", FEEDBACK_SIGNATURE, |_| Ok(3.0));

        let sample = driver.tick(&generator(|_| 0.0), &f, &controller).unwrap().unwrap();
        assert_eq!(sample.input, 6.5);
    }

    #[test]
    fn previous_output_feeds_back() {
        let params = SignalParameters::default();
        let mut driver = LoopDriver::new(params);
        let controller = integrating_controller();
        let (g, f) = (generator(|_| 1.0), direct_feedback());

        let first = driver.tick(&g, &f, &controller).unwrap().unwrap();
        let second = driver.tick(&g, &f, &controller).unwrap().unwrap();
        assert_eq!(second.input, first.output);
        assert_eq!(driver.previous_output(), second.output);
    }

    #[test]
    fn failing_function_is_a_fault() {
        let mut driver = LoopDriver::new(SignalParameters::default());
        let controller = integrating_controller();
        let bad = FunctionHandle::new("bad", GENERATOR_SIGNATURE, |_| Err("division by zero".to_string()));

        let fault = driver.tick(&bad, &direct_feedback(), &controller).unwrap_err();
        assert_eq!(fault.tick, 0);
        assert!(fault.message.contains("division by zero"));
        assert_eq!(driver.tick_index(), 0);
    }

    #[test]
    fn overflowing_feedback_scale_is_a_fault() {
        let params = SignalParameters::new(0, 100, 0.0, 10.0).unwrap();
        let mut driver = LoopDriver::new(params);
        let controller = integrating_controller();
        let f = FunctionHandle::new("max", FEEDBACK_SIGNATURE, |_| Ok(f64::MAX));

        let fault = driver.tick(&generator(|_| 0.0), &f, &controller).unwrap_err();
        assert!(fault.message.contains("scaled feedback input"));
        assert_eq!(driver.previous_output(), 0.0);
        assert_eq!(driver.tick_index(), 0);
    }

    #[test]
    fn non_finite_and_panicking_functions_are_faults() {
        let mut driver = LoopDriver::new(SignalParameters::default());
        let controller = integrating_controller();

        let nan = FunctionHandle::new("nan", GENERATOR_SIGNATURE, |_| Ok(f64::NAN));
        assert!(driver.tick(&nan, &direct_feedback(), &controller).is_err());

        let panics = FunctionHandle::new("boom", FEEDBACK_SIGNATURE, |_| panic!("boom"));
        let fault = driver.tick(&generator(|_| 1.0), &panics, &controller).unwrap_err();
        assert!(fault.message.contains("panicked"));
    }
}
