//! session.rs
//! Command dispatch between a front end and the control loop.
//!
//! A front end only ever builds [`Command`]s from what the user typed and hands them to
//! [`Session::dispatch`]. Each settings command is a two-phase transaction: the raw text
//! is validated in full before anything is committed, so a rejected command leaves every
//! value, the controller state and both function slots untouched.

use std::{path::Path, sync::Arc};

use log::info;

use crate::control::{
    function::{CatalogBinder, FunctionBinder, FunctionSlot, Signature, FEEDBACK_SIGNATURE, GENERATOR_SIGNATURE},
    lifecycle::{ControlLoop, ControllerState},
};
use crate::error::{HarnessError, HarnessResult, SchedulerFault};
use crate::settings::{
    transaction::SettingsTransaction,
    validator::{validate_pid_settings, validate_plot_settings, validate_signal_settings},
    values::{OutputRange, PidSettingsInput, PlotRange, PlotSettingsInput, SignalParameters, SignalSettingsInput, Tuning},
};
use crate::utils::{
    config::HarnessConfig,
    export::{export_metrics_csv, export_series_csv},
    metrics::SchedulerMetrics,
    series::LiveSeriesBuffer,
};

pub const SERIES_FILE: &str = "series.csv";
pub const METRICS_FILE: &str = "metrics.csv";

/// Everything a front end can ask for.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ApplyPlotSettings(PlotSettingsInput),
    ApplyPidSettings(PidSettingsInput),
    RunPid(bool),
    ResetPid,
    InitializePid,
    /// `true` restarts the signal from tick 0 with the given settings; `false` stops it.
    RunSignal(bool, SignalSettingsInput),
    SetGeneratorFunction(String),
    SetFeedbackFunction(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ApplyPlotSettings(_) => "ApplyPlotSettings",
            Command::ApplyPidSettings(_) => "ApplyPidSettings",
            Command::RunPid(_) => "RunPid",
            Command::ResetPid => "ResetPid",
            Command::InitializePid => "InitializePid",
            Command::RunSignal(..) => "RunSignal",
            Command::SetGeneratorFunction(_) => "SetGeneratorFunction",
            Command::SetFeedbackFunction(_) => "SetFeedbackFunction",
        }
    }
}

pub struct Session {
    control: ControlLoop,
    binder: Box<dyn FunctionBinder>,
    plot: PlotRange,
}

impl Session {
    /// Fresh session in UNINITIALIZED with empty function slots.
    pub fn new(binder: Box<dyn FunctionBinder>, buffer: Arc<LiveSeriesBuffer>) -> Self {
        Self {
            control: ControlLoop::with_pid(buffer),
            binder,
            plot: PlotRange::default(),
        }
    }

    /// Catalog-backed session with the configured buffer and default functions bound.
    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        let buffer = Arc::new(LiveSeriesBuffer::with_default_channels(config.buffer.capacity));
        let mut session = Self::new(Box::new(CatalogBinder::new()), buffer);

        session.dispatch(Command::SetGeneratorFunction(config.functions.generator.clone()))?;
        session.dispatch(Command::SetFeedbackFunction(config.functions.feedback.clone()))?;
        Ok(session)
    }

    pub fn dispatch(&mut self, command: Command) -> HarnessResult<()> {
        info!("[Session] {}", command.name());

        match command {
            Command::ApplyPlotSettings(input) => {
                let buffer = self.control.buffer().clone();
                let plot = &mut self.plot;
                SettingsTransaction::new("plot settings").apply(
                    || validate_plot_settings(&input),
                    |range| {
                        *plot = range;
                        buffer.set_domain_window(range.domain_length());
                        buffer.set_range(range.range_min(), range.range_max());
                        Ok(())
                    },
                )
            }
            Command::ApplyPidSettings(input) => {
                let control = &mut self.control;
                SettingsTransaction::new("PID settings").apply(
                    || validate_pid_settings(&input),
                    |(tuning, range)| {
                        control.apply_pid_settings(tuning, range);
                        Ok(())
                    },
                )
            }
            Command::RunPid(true) => {
                let readiness = self.control.run_readiness();
                let control = &mut self.control;
                SettingsTransaction::new("run")
                    .check(move || readiness.check())
                    .commit(|| control.run(true))
            }
            Command::RunPid(false) => self.control.run(false),
            Command::ResetPid => {
                let control = &mut self.control;
                SettingsTransaction::new("reset").commit(|| Ok(control.reset()?))
            }
            Command::InitializePid => {
                let control = &mut self.control;
                SettingsTransaction::new("initialize").commit(|| Ok(control.initialize()?))
            }
            // Readiness is checked before the fields, so a loop that cannot run reports
            // that first and its buffer is never cleared.
            Command::RunSignal(true, input) => {
                let readiness = self.control.run_readiness();
                let control = &mut self.control;
                SettingsTransaction::new("signal settings")
                    .check(move || readiness.check())
                    .apply(|| validate_signal_settings(&input), |params| control.restart_signal(params))
            }
            Command::RunSignal(false, _) => self.control.run(false),
            Command::SetGeneratorFunction(script) => {
                self.bind(&script, &GENERATOR_SIGNATURE, self.control.generator_slot())
            }
            Command::SetFeedbackFunction(script) => {
                self.bind(&script, &FEEDBACK_SIGNATURE, self.control.feedback_slot())
            }
        }
    }

    fn bind(&self, script: &str, signature: &Signature, slot: &FunctionSlot) -> HarnessResult<()> {
        SettingsTransaction::new(signature.slot).apply(
            || self.binder.bind(script, signature),
            |handle| slot.replace(handle).map_err(HarnessError::from),
        )
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    pub fn state(&self) -> ControllerState {
        self.control.state()
    }

    pub fn buffer(&self) -> &Arc<LiveSeriesBuffer> {
        self.control.buffer()
    }

    pub fn plot_range(&self) -> PlotRange {
        self.plot
    }

    pub fn tuning(&self) -> Option<Tuning> {
        self.control.tuning()
    }

    pub fn output_range(&self) -> Option<OutputRange> {
        self.control.output_range()
    }

    pub fn signal_parameters(&self) -> SignalParameters {
        self.control.signal_parameters()
    }

    pub fn generator_name(&self) -> Option<String> {
        self.control.generator_slot().current().map(|h| h.name().to_string())
    }

    pub fn feedback_name(&self) -> Option<String> {
        self.control.feedback_slot().current().map(|h| h.name().to_string())
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.control.metrics()
    }

    /// Faults raised by the scheduler since the last poll; the loop is STOPPED afterwards.
    pub fn poll_faults(&mut self) -> Vec<SchedulerFault> {
        self.control.poll_faults()
    }

    /// Writes the series and a metrics summary into `dir`. Returns the series row count.
    pub fn export(&self, dir: &Path) -> HarnessResult<usize> {
        let rows = export_series_csv(self.buffer(), &dir.join(SERIES_FILE))?;
        export_metrics_csv(&self.metrics(), &dir.join(METRICS_FILE))?;
        Ok(rows)
    }

    /// Stops the scheduler. The session stays usable; dropping it does the same.
    pub fn shutdown(&mut self) {
        self.control.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn session() -> Session {
        Session::from_config(&HarnessConfig::default()).unwrap()
    }

    #[test]
    fn from_config_binds_default_functions() {
        let s = session();
        assert_eq!(s.generator_name().as_deref(), Some("sine"));
        assert_eq!(s.feedback_name().as_deref(), Some("direct"));
        assert_eq!(s.state(), ControllerState::Uninitialized);
    }

    #[test]
    fn plot_settings_forward_display_hints() {
        let mut s = session();
        let input = PlotSettingsInput {
            domain_length: "5000".into(),
            range_maximum: "10".into(),
            range_minimum: "-10".into(),
        };
        s.dispatch(Command::ApplyPlotSettings(input)).unwrap();
        assert_eq!(s.plot_range().domain_length(), 5_000);
        assert_eq!(s.buffer().domain_window(), Some(5_000));
        assert_eq!(s.buffer().range(), Some((-10.0, 10.0)));
    }

    #[test]
    fn rejected_plot_settings_keep_previous_range() {
        let mut s = session();
        let input = PlotSettingsInput {
            domain_length: "0".into(),
            range_maximum: "1".into(),
            range_minimum: "0".into(),
        };
        let err = s.dispatch(Command::ApplyPlotSettings(input)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Value for domain axis length must be greater than 0.");
        assert_eq!(s.plot_range(), PlotRange::default());
        assert_eq!(s.buffer().domain_window(), None);
    }

    #[test]
    fn bind_error_keeps_previous_function() {
        let mut s = session();
        let err = s.dispatch(Command::SetGeneratorFunction("no_such_wave".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Bind);
        assert_eq!(s.generator_name().as_deref(), Some("sine"));
    }

    #[test]
    fn command_names() {
        assert_eq!(Command::RunSignal(false, SignalSettingsInput::default()).name(), "RunSignal");
        assert_eq!(Command::ResetPid.name(), "ResetPid");
    }
}
