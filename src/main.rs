//! # PID Harness Console
//!
//! Interactive front end for the PID controller test harness.
//!
//! ## Flow
//! - Load `HarnessConfig` (`$PID_HARNESS_CONFIG`, `./harness.toml`, or defaults).
//! - Build a `Session` with the configured generator/feedback functions bound.
//! - Each menu entry reads the fields it needs (Enter keeps the shown value) and
//!   dispatches one `Command`. Errors are printed as `[kind] message`.
//! - A renderer thread drains buffer events from a `ChannelSink` (logged at debug).
//! - Exit (or EOF) shuts the scheduler down before the process ends.

use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    sync::Arc,
    thread,
};

use log::{debug, error, info};

use pid_harness::{
    control::function::{CatalogBinder, FEEDBACK_SIGNATURE, GENERATOR_SIGNATURE},
    error::HarnessError,
    session::{Command, Session},
    settings::values::{PidSettingsInput, PlotSettingsInput, SignalSettingsInput},
    utils::{
        config::HarnessConfig,
        series::{ChannelSink, SeriesEvent},
    },
};

const SINK_QUEUE_CAPACITY: usize = 4096;
const DEFAULT_EXPORT_DIR: &str = "data";

/// Field values shown as defaults; updated with whatever the user last entered.
struct Forms {
    plot: PlotSettingsInput,
    pid: PidSettingsInput,
    signal: SignalSettingsInput,
}

fn main() {
    env_logger::init();
    info!("=== PID HARNESS START ===");

    let config = match HarnessConfig::load() {
        Ok(config) => config,
        Err(e) => {
            report(&HarnessError::from(e));
            println!("Continuing with built-in defaults.");
            HarnessConfig::default()
        }
    };

    let mut session = match Session::from_config(&config) {
        Ok(session) => session,
        Err(e) => {
            report(&e);
            error!("[Main] could not bind default functions, exiting");
            return;
        }
    };

    let (sink, events) = ChannelSink::new(SINK_QUEUE_CAPACITY);
    session.buffer().add_sink(Arc::new(sink));
    // Ends once the buffer (and with it the sink) is dropped.
    let renderer = thread::Builder::new()
        .name("series-renderer".to_string())
        .spawn(move || {
            for event in events.iter() {
                match event {
                    SeriesEvent::Append { timestamp, values, .. } => {
                        debug!("[Renderer] t={} {:?}", timestamp, values)
                    }
                    other => debug!("[Renderer] {:?}", other),
                }
            }
        });

    let mut forms = Forms {
        plot: config.plot_input(),
        pid: config.pid_input(),
        signal: config.signal_input(),
    };

    loop {
        for fault in session.poll_faults() {
            report(&HarnessError::from(fault));
        }

        let Some(choice) = prompt_menu(&session) else {
            break;
        };
        let result = match choice.as_str() {
            "1" => {
                edit_plot(&mut forms.plot);
                session.dispatch(Command::ApplyPlotSettings(forms.plot.clone()))
            }
            "2" => {
                edit_pid(&mut forms.pid);
                session.dispatch(Command::ApplyPidSettings(forms.pid.clone()))
            }
            "3" => session.dispatch(Command::InitializePid),
            "4" => session.dispatch(Command::RunPid(true)),
            "5" => session.dispatch(Command::RunPid(false)),
            "6" => session.dispatch(Command::ResetPid),
            "7" => {
                edit_signal(&mut forms.signal);
                session.dispatch(Command::RunSignal(true, forms.signal.clone()))
            }
            "8" => session.dispatch(Command::RunSignal(false, forms.signal.clone())),
            "9" => {
                list_catalog(GENERATOR_SIGNATURE.slot);
                let script = prompt_line("Generator function", "");
                session.dispatch(Command::SetGeneratorFunction(script))
            }
            "10" => {
                list_catalog(FEEDBACK_SIGNATURE.slot);
                let script = prompt_line("Feedback function", "");
                session.dispatch(Command::SetFeedbackFunction(script))
            }
            "11" => {
                print_status(&session);
                Ok(())
            }
            "12" => {
                let dir = PathBuf::from(prompt_line("Export directory", DEFAULT_EXPORT_DIR));
                session.export(&dir).map(|rows| {
                    println!("Exported {} rows to {}", rows, dir.display());
                })
            }
            "13" | "q" => break,
            "" => Ok(()),
            other => {
                println!("Unrecognized option '{}', please try again.", other);
                Ok(())
            }
        };

        if let Err(e) = result {
            report(&e);
        }
    }

    session.shutdown();
    drop(session);
    if let Ok(handle) = renderer {
        let _ = handle.join();
    }
    println!("Exiting. Goodbye!");
    info!("=== PID HARNESS FINISHED ===");
}

fn report(err: &HarnessError) {
    println!("[{}] {}", err.kind(), err);
}

/// Returns `None` on EOF.
fn prompt_menu(session: &Session) -> Option<String> {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│  PID HARNESS               state: {:<10}│", session.state().to_string());
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Plot settings      2) PID settings      │");
    println!("│  3) Initialize PID     4) Run PID           │");
    println!("│  5) Stop PID           6) Reset PID         │");
    println!("│  7) Start signal       8) Stop signal       │");
    println!("│  9) Generator function                      │");
    println!("│ 10) Feedback function                       │");
    println!("│ 11) Status            12) Export CSV        │");
    println!("│ 13) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select: ");
    let _ = stdout().flush();

    let mut input = String::new();
    match stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

/// Reads one field; an empty line keeps `current`.
fn prompt_line(label: &str, current: &str) -> String {
    print!("{} [{}]: ", label, current);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    let value = input.trim();
    if value.is_empty() { current.to_string() } else { value.to_string() }
}

fn prompt_flag(label: &str, current: bool) -> bool {
    let answer = prompt_line(label, if current { "y" } else { "n" });
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes" | "true" | "1")
}

fn edit(field: &mut String, label: &str) {
    *field = prompt_line(label, field);
}

fn edit_plot(form: &mut PlotSettingsInput) {
    edit(&mut form.domain_length, "Domain axis length (ms)");
    edit(&mut form.range_maximum, "Range axis maximum");
    edit(&mut form.range_minimum, "Range axis minimum");
}

fn edit_pid(form: &mut PidSettingsInput) {
    edit(&mut form.proportional_gain, "Proportional gain");
    edit(&mut form.integral_gain, "Integral gain");
    edit(&mut form.derivative_gain, "Derivative gain");
    edit(&mut form.filter_coefficient, "Filter coefficient");
    form.proportional_on_measurement = prompt_flag("Proportional on measurement", form.proportional_on_measurement);
    form.inverse = prompt_flag("Inverse", form.inverse);
    edit(&mut form.output_maximum, "Output maximum");
    edit(&mut form.output_minimum, "Output minimum");
}

fn edit_signal(form: &mut SignalSettingsInput) {
    edit(&mut form.calculation_skip, "Calculation skip (ticks)");
    edit(&mut form.sample_time, "Sample time (ms)");
    edit(&mut form.offset, "Offset");
    edit(&mut form.factor, "Factor");
}

fn list_catalog(slot: &str) {
    let signature = if slot == GENERATOR_SIGNATURE.slot { GENERATOR_SIGNATURE } else { FEEDBACK_SIGNATURE };
    println!("Available {} functions ({}):", slot, signature.parameters.join(", "));
    for (name, description) in CatalogBinder::entries(&signature) {
        println!("  {:<16} {}", name, description);
    }
}

fn print_status(session: &Session) {
    println!("State:      {}", session.state());
    println!(
        "Functions:  generator={} feedback={}",
        session.generator_name().unwrap_or_else(|| "-".into()),
        session.feedback_name().unwrap_or_else(|| "-".into())
    );
    match (session.tuning(), session.output_range()) {
        (Some(t), Some(r)) => println!(
            "PID:        kp={} ki={} kd={} N={} pom={} inverse={} out=[{}, {}]",
            t.proportional_gain(),
            t.integral_gain(),
            t.derivative_gain(),
            t.filter_coefficient(),
            t.proportional_on_measurement(),
            t.inverse(),
            r.minimum(),
            r.maximum()
        ),
        _ => println!("PID:        not configured"),
    }

    let signal = session.signal_parameters();
    println!(
        "Signal:     skip={} sample={}ms offset={} factor={}",
        signal.calculation_skip(),
        signal.sample_time_millis(),
        signal.offset(),
        signal.factor()
    );

    let buffer = session.buffer();
    for (name, latest) in buffer.channel_names().iter().zip(buffer.latest()) {
        match latest {
            Some((t, v)) => println!("  {:<10} t={:>8}ms  {:.6}", name, t, v),
            None => println!("  {:<10} (no data)", name),
        }
    }

    let metrics = session.metrics();
    println!(
        "Scheduler:  ticks={} emitted={} overruns={} faults={} jitter max={}us mean={:.1}us",
        metrics.ticks,
        metrics.emitted,
        metrics.overruns,
        metrics.faults,
        metrics.max_jitter_us,
        metrics.mean_jitter_us().unwrap_or(0.0)
    );
}
