//! function.rs
//! Generator and feedback functions bound from user script text.
//!
//! - [`FunctionBinder`] turns script text into a [`FunctionHandle`] matching a [`Signature`].
//! - [`FunctionSlot`] holds the handle currently bound for one role. Rebinding swaps the
//!   `Arc` so a tick already holding the previous handle finishes with it safely.
//! - [`CatalogBinder`] binds scripts by name from a fixed catalog of demo functions.

use std::{
    f64::consts::PI,
    fmt,
    sync::Arc,
};

use log::info;
use parking_lot::{Mutex, RwLock};
use rand::random_range;

use crate::error::BindError;

/// Expected arity of a bound function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub slot: &'static str,
    pub parameters: &'static [&'static str],
}

impl Signature {
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

/// `(time_ms) -> setpoint`
pub const GENERATOR_SIGNATURE: Signature = Signature {
    slot: "generator",
    parameters: &["time_ms"],
};

/// `(setpoint, previous_output) -> input`
pub const FEEDBACK_SIGNATURE: Signature = Signature {
    slot: "feedback",
    parameters: &["setpoint", "previous_output"],
};

type Callable = dyn Fn(&[f64]) -> Result<f64, String> + Send + Sync;

/// Opaque callable bound to a fixed signature.
#[derive(Clone)]
pub struct FunctionHandle {
    name: String,
    signature: Signature,
    func: Arc<Callable>,
}

impl FunctionHandle {
    pub fn new<F>(name: impl Into<String>, signature: Signature, func: F) -> Self
    where
        F: Fn(&[f64]) -> Result<f64, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn call(&self, args: &[f64]) -> Result<f64, String> {
        if args.len() != self.signature.arity() {
            return Err(format!(
                "{} function '{}' expects {} argument(s), got {}",
                self.signature.slot,
                self.name,
                self.signature.arity(),
                args.len()
            ));
        }
        (self.func)(args)
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Compiles script text into a callable. Errors carry a message for the user.
pub trait FunctionBinder: Send {
    fn bind(&self, script: &str, signature: &Signature) -> Result<FunctionHandle, BindError>;
}

/// The function currently bound for one role.
pub struct FunctionSlot {
    signature: Signature,
    current: RwLock<Option<FunctionHandle>>,
}

impl FunctionSlot {
    pub fn new(signature: Signature) -> Self {
        Self { signature, current: RwLock::new(None) }
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Replaces the bound handle. The previous one stays alive for whoever still holds it.
    pub fn replace(&self, handle: FunctionHandle) -> Result<(), BindError> {
        if handle.signature() != self.signature {
            return Err(BindError::new(
                self.signature.slot,
                format!(
                    "Function '{}' was bound for the {} slot, not the {} slot.",
                    handle.name(),
                    handle.signature().slot,
                    self.signature.slot
                ),
            ));
        }
        info!("[Functions] {} function set to '{}'", self.signature.slot, handle.name());
        *self.current.write() = Some(handle);
        Ok(())
    }

    pub fn current(&self) -> Option<FunctionHandle> {
        self.current.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.current.read().is_some()
    }
}

// ============================================================================
// Built-in catalog
// ============================================================================

const WAVE_PERIOD_MS: f64 = 10_000.0;
const STEP_AT_MS: f64 = 1_000.0;
const LAG_ALPHA: f64 = 0.1;
const INTEGRATOR_GAIN: f64 = 0.1;

struct CatalogEntry {
    name: &'static str,
    slot: &'static str,
    description: &'static str,
    build: fn(&'static str, Signature) -> FunctionHandle,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "sine",
        slot: "generator",
        description: "sin(2*pi*t / 10000)",
        build: |name, sig| FunctionHandle::new(name, sig, |a| Ok((2.0 * PI * a[0] / WAVE_PERIOD_MS).sin())),
    },
    CatalogEntry {
        name: "square",
        slot: "generator",
        description: "+1 for the first half of each 10 s period, -1 for the second",
        build: |name, sig| {
            FunctionHandle::new(name, sig, |a| {
                Ok(if a[0].rem_euclid(WAVE_PERIOD_MS) < WAVE_PERIOD_MS / 2.0 { 1.0 } else { -1.0 })
            })
        },
    },
    CatalogEntry {
        name: "step",
        slot: "generator",
        description: "0 before t = 1000 ms, 1 afterwards",
        build: |name, sig| FunctionHandle::new(name, sig, |a| Ok(if a[0] < STEP_AT_MS { 0.0 } else { 1.0 })),
    },
    CatalogEntry {
        name: "sawtooth",
        slot: "generator",
        description: "ramp from -1 to 1 every 10 s",
        build: |name, sig| {
            FunctionHandle::new(name, sig, |a| Ok(a[0].rem_euclid(WAVE_PERIOD_MS) / WAVE_PERIOD_MS * 2.0 - 1.0))
        },
    },
    CatalogEntry {
        name: "constant",
        slot: "generator",
        description: "1",
        build: |name, sig| FunctionHandle::new(name, sig, |_| Ok(1.0)),
    },
    CatalogEntry {
        name: "noise",
        slot: "generator",
        description: "uniform noise in [-1, 1)",
        build: |name, sig| FunctionHandle::new(name, sig, |_| Ok(random_range(-1.0..1.0))),
    },
    CatalogEntry {
        name: "direct",
        slot: "feedback",
        description: "input = previous output",
        build: |name, sig| FunctionHandle::new(name, sig, |a| Ok(a[1])),
    },
    CatalogEntry {
        name: "inverted",
        slot: "feedback",
        description: "input = -previous output",
        build: |name, sig| FunctionHandle::new(name, sig, |a| Ok(-a[1])),
    },
    CatalogEntry {
        name: "first_order_lag",
        slot: "feedback",
        description: "input follows previous output with a first-order lag (alpha 0.1)",
        build: |name, sig| {
            let state = Mutex::new(0.0_f64);
            FunctionHandle::new(name, sig, move |a| {
                let mut y = state.lock();
                *y += (a[1] - *y) * LAG_ALPHA;
                Ok(*y)
            })
        },
    },
    CatalogEntry {
        name: "integrator",
        slot: "feedback",
        description: "input integrates previous output (gain 0.1 per tick)",
        build: |name, sig| {
            let state = Mutex::new(0.0_f64);
            FunctionHandle::new(name, sig, move |a| {
                let mut y = state.lock();
                *y += a[1] * INTEGRATOR_GAIN;
                Ok(*y)
            })
        },
    },
];

/// Binds script text by catalog name. Each bind creates fresh function state.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogBinder;

impl CatalogBinder {
    pub fn new() -> Self {
        Self
    }

    /// `(name, description)` of every catalog entry usable for `signature`.
    pub fn entries(signature: &Signature) -> Vec<(&'static str, &'static str)> {
        CATALOG
            .iter()
            .filter(|e| e.slot == signature.slot)
            .map(|e| (e.name, e.description))
            .collect()
    }
}

impl FunctionBinder for CatalogBinder {
    fn bind(&self, script: &str, signature: &Signature) -> Result<FunctionHandle, BindError> {
        let name = script.trim();
        if name.is_empty() {
            return Err(BindError::new(signature.slot, "Script is empty."));
        }

        match CATALOG.iter().find(|e| e.slot == signature.slot && e.name == name) {
            Some(entry) => Ok((entry.build)(entry.name, *signature)),
            None => {
                let available: Vec<&str> = Self::entries(signature).into_iter().map(|(n, _)| n).collect();
                Err(BindError::new(
                    signature.slot,
                    format!(
                        "Unknown {} function '{}'. Available: {}.",
                        signature.slot,
                        name,
                        available.join(", ")
                    ),
                ))
            }
        }
    }
}
