//! lifecycle.rs
//! Controller state machine and ownership of the running loop.
//!
//! ```text
//! UNINITIALIZED --initialize--> CONFIGURED --run(true)--> RUNNING
//! RUNNING --run(false) / fault--> STOPPED --run(true)--> RUNNING
//! any --reset--> CONFIGURED (stops the scheduler first)
//! ```
//!
//! The scheduler thread is alive exactly while the state is RUNNING. A fault ends the
//! thread on its own; the transition to STOPPED is observed the next time the loop is
//! polled or asked for a transition.

use std::{fmt, sync::Arc};

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{info, warn};
use parking_lot::Mutex;

use crate::control::{
    function::{FunctionSlot, FEEDBACK_SIGNATURE, GENERATOR_SIGNATURE},
    pid::{self, PidController, SharedController},
    scheduler::{LoopDriver, SignalScheduler, TickContext},
};
use crate::error::{HarnessResult, PreconditionError, SchedulerFault};
use crate::settings::values::{OutputRange, SignalParameters, Tuning};
use crate::utils::{
    metrics::{SchedulerMetrics, SharedSchedulerMetrics},
    series::LiveSeriesBuffer,
};

const FAULT_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Uninitialized,
    Configured,
    Running,
    Stopped,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControllerState::Uninitialized => "UNINITIALIZED",
            ControllerState::Configured => "CONFIGURED",
            ControllerState::Running => "RUNNING",
            ControllerState::Stopped => "STOPPED",
        })
    }
}

/// Run preconditions as seen at the time the readiness was taken. Slot bindings are
/// read live when [`check`](Self::check) runs.
#[derive(Clone)]
pub struct RunReadiness {
    state: ControllerState,
    generator: Arc<FunctionSlot>,
    feedback: Arc<FunctionSlot>,
}

impl RunReadiness {
    pub fn check(&self) -> Result<(), PreconditionError> {
        if self.state == ControllerState::Uninitialized {
            return Err(PreconditionError::new(
                "run",
                self.state,
                "controller is not initialized",
            ));
        }
        if !self.generator.is_bound() {
            return Err(PreconditionError::new("run", self.state, "no generator function is bound"));
        }
        if !self.feedback.is_bound() {
            return Err(PreconditionError::new("run", self.state, "no feedback function is bound"));
        }
        Ok(())
    }
}

pub struct ControlLoop {
    state: ControllerState,
    controller: SharedController,
    signal: SignalParameters,
    /// Logical clock carried across stop/run.
    driver: LoopDriver,
    generator: Arc<FunctionSlot>,
    feedback: Arc<FunctionSlot>,
    buffer: Arc<LiveSeriesBuffer>,
    scheduler: SignalScheduler,
    metrics: SharedSchedulerMetrics,
    fault_tx: Sender<SchedulerFault>,
    fault_rx: Receiver<SchedulerFault>,
    pending_faults: Vec<SchedulerFault>,
}

impl ControlLoop {
    pub fn new(controller: SharedController, buffer: Arc<LiveSeriesBuffer>) -> Self {
        let (fault_tx, fault_rx) = bounded(FAULT_QUEUE_CAPACITY);
        let signal = SignalParameters::default();

        Self {
            state: ControllerState::Uninitialized,
            controller,
            signal,
            driver: LoopDriver::new(signal),
            generator: Arc::new(FunctionSlot::new(GENERATOR_SIGNATURE)),
            feedback: Arc::new(FunctionSlot::new(FEEDBACK_SIGNATURE)),
            buffer,
            scheduler: SignalScheduler::new(),
            metrics: Arc::new(Mutex::new(SchedulerMetrics::default())),
            fault_tx,
            fault_rx,
            pending_faults: Vec::new(),
        }
    }

    /// Loop around an untuned [`PidController`].
    pub fn with_pid(buffer: Arc<LiveSeriesBuffer>) -> Self {
        Self::new(pid::shared(PidController::new()), buffer)
    }

    /// Last observed state. Call [`poll_faults`](Self::poll_faults) to pick up a fault
    /// that stopped the scheduler in the background.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn buffer(&self) -> &Arc<LiveSeriesBuffer> {
        &self.buffer
    }

    pub fn generator_slot(&self) -> &Arc<FunctionSlot> {
        &self.generator
    }

    pub fn feedback_slot(&self) -> &Arc<FunctionSlot> {
        &self.feedback
    }

    pub fn signal_parameters(&self) -> SignalParameters {
        self.signal
    }

    /// Current position of the logical clock (next tick to run).
    pub fn tick_index(&self) -> u64 {
        self.driver.tick_index()
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.lock().clone()
    }

    pub fn tuning(&self) -> Option<Tuning> {
        self.controller.lock().tuning()
    }

    pub fn output_range(&self) -> Option<OutputRange> {
        self.controller.lock().output_range()
    }

    /// Commits tuning and range together. Legal in every state; a running loop picks
    /// the change up on its next tick.
    pub fn apply_pid_settings(&mut self, tuning: Tuning, range: OutputRange) {
        {
            let mut controller = self.controller.lock();
            controller.retune(tuning);
            controller.set_output_range(range);
        }
        info!(
            "[Lifecycle] PID settings applied: kp={} ki={} kd={} N={} pom={} inverse={} range=[{}, {}]",
            tuning.proportional_gain(),
            tuning.integral_gain(),
            tuning.derivative_gain(),
            tuning.filter_coefficient(),
            tuning.proportional_on_measurement(),
            tuning.inverse(),
            range.minimum(),
            range.maximum()
        );
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub fn initialize(&mut self) -> Result<(), PreconditionError> {
        self.reap();
        if self.state == ControllerState::Running {
            return Err(PreconditionError::new(
                "initialize",
                self.state,
                "stop the controller first",
            ));
        }
        self.require_settings("initialize")?;

        self.controller.lock().reset();
        self.transition(ControllerState::Configured);
        Ok(())
    }

    /// Everything `run(true)` needs, checked without side effects.
    pub fn check_can_run(&self) -> Result<(), PreconditionError> {
        self.run_readiness().check()
    }

    /// Detached view of the run preconditions, usable while the loop itself is borrowed
    /// for the commit that follows.
    pub fn run_readiness(&self) -> RunReadiness {
        RunReadiness {
            state: self.state,
            generator: self.generator.clone(),
            feedback: self.feedback.clone(),
        }
    }

    /// `run(true)` starts (or resumes) the scheduler, `run(false)` stops it.
    /// Both are no-ops when the loop is already in the requested condition.
    pub fn run(&mut self, run: bool) -> HarnessResult<()> {
        self.reap();
        if !run {
            if self.state == ControllerState::Running {
                self.stop_scheduler();
                self.transition(ControllerState::Stopped);
            }
            return Ok(());
        }

        if self.state == ControllerState::Running {
            return Ok(());
        }
        self.check_can_run()?;
        self.start_scheduler()?;
        self.transition(ControllerState::Running);
        Ok(())
    }

    /// Clears controller memory and returns to CONFIGURED, stopping a running loop first.
    pub fn reset(&mut self) -> Result<(), PreconditionError> {
        self.reap();
        self.require_settings("reset")?;

        if self.state == ControllerState::Running {
            self.stop_scheduler();
        }
        self.controller.lock().reset();
        self.transition(ControllerState::Configured);
        Ok(())
    }

    /// Restarts the signal from tick 0 with new parameters and an empty buffer.
    pub fn restart_signal(&mut self, params: SignalParameters) -> HarnessResult<()> {
        self.reap();
        self.check_can_run()?;

        if self.state == ControllerState::Running {
            self.stop_scheduler();
            self.transition(ControllerState::Stopped);
        }

        self.buffer.clear();
        self.signal = params;
        self.driver = LoopDriver::new(params);
        info!(
            "[Lifecycle] signal restarted: skip={} sample={}ms offset={} factor={}",
            params.calculation_skip(),
            params.sample_time_millis(),
            params.offset(),
            params.factor()
        );
        self.run(true)
    }

    /// Faults raised since the last call. Observing a fault moves the loop to STOPPED.
    pub fn poll_faults(&mut self) -> Vec<SchedulerFault> {
        self.reap();
        std::mem::take(&mut self.pending_faults)
    }

    /// Stops the scheduler and waits for it. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.scheduler.is_active() {
            self.stop_scheduler();
            if self.state == ControllerState::Running {
                self.transition(ControllerState::Stopped);
            }
            info!("[Lifecycle] shut down");
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require_settings(&self, operation: &'static str) -> Result<(), PreconditionError> {
        let controller = self.controller.lock();
        if controller.tuning().is_none() || controller.output_range().is_none() {
            return Err(PreconditionError::new(
                operation,
                self.state,
                "no PID settings have been applied",
            ));
        }
        Ok(())
    }

    fn start_scheduler(&mut self) -> Result<(), SchedulerFault> {
        let ctx = TickContext {
            driver: self.driver.clone(),
            controller: self.controller.clone(),
            generator: self.generator.clone(),
            feedback: self.feedback.clone(),
            buffer: self.buffer.clone(),
            faults: self.fault_tx.clone(),
            metrics: self.metrics.clone(),
        };

        self.scheduler.start(ctx).map_err(|e| SchedulerFault {
            tick: self.driver.tick_index(),
            message: format!("failed to start scheduler thread: {}", e),
        })
    }

    fn stop_scheduler(&mut self) {
        if let Some(driver) = self.scheduler.stop() {
            self.driver = driver;
        }
        self.drain_faults();
    }

    fn drain_faults(&mut self) {
        self.pending_faults.extend(self.fault_rx.try_iter());
    }

    /// Notices a scheduler that ended on its own and settles the state.
    fn reap(&mut self) {
        self.drain_faults();
        if self.state == ControllerState::Running && !self.scheduler.is_running() {
            self.stop_scheduler();
            warn!("[Lifecycle] scheduler ended at tick {}", self.driver.tick_index());
            self.transition(ControllerState::Stopped);
        }
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            info!("[Lifecycle] {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
