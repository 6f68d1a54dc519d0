//! transaction.rs
//! Two-phase commit for settings changes.
//!
//! Phase 1 runs every check in order and stops at the first failure; nothing is
//! mutated. Phase 2 runs only when all checks passed and hands the validated value
//! to the commit step, which replaces whole value objects on its target.

use log::debug;

use crate::error::HarnessError;

type Check<'a> = Box<dyn FnOnce() -> Result<(), HarnessError> + 'a>;

pub struct SettingsTransaction<'a> {
    name: &'static str,
    checks: Vec<Check<'a>>,
}

impl<'a> SettingsTransaction<'a> {
    pub fn new(name: &'static str) -> Self {
        Self { name, checks: Vec::new() }
    }

    /// Queues a side-effect-free check. Checks run in the order they were added.
    pub fn check<E>(mut self, check: impl FnOnce() -> Result<(), E> + 'a) -> Self
    where
        E: Into<HarnessError> + 'a,
    {
        self.checks.push(Box::new(move || check().map_err(Into::into)));
        self
    }

    /// Runs the queued checks, then `validate`, then `commit` with the validated value.
    ///
    /// The first failing check is the single error reported; later checks are not
    /// evaluated and `commit` is never called.
    pub fn apply<T, R, E>(
        self,
        validate: impl FnOnce() -> Result<T, E>,
        commit: impl FnOnce(T) -> Result<R, HarnessError>,
    ) -> Result<R, HarnessError>
    where
        E: Into<HarnessError>,
    {
        for check in self.checks {
            if let Err(err) = check() {
                debug!("[Transaction] {} rejected: {}", self.name, err);
                return Err(err);
            }
        }

        let value = validate().map_err(|e| {
            let err = e.into();
            debug!("[Transaction] {} rejected: {}", self.name, err);
            err
        })?;

        debug!("[Transaction] {} committing", self.name);
        commit(value)
    }

    /// Same as [`apply`](Self::apply) for changes that need no validated value.
    pub fn commit<R>(self, commit: impl FnOnce() -> Result<R, HarnessError>) -> Result<R, HarnessError> {
        self.apply(|| Ok::<(), HarnessError>(()), |()| commit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ValidationError};
    use std::cell::Cell;

    #[test]
    fn commit_runs_after_all_checks_pass() {
        let evaluated = Cell::new(0);
        let committed = Cell::new(None);

        let result = SettingsTransaction::new("test")
            .check(|| {
                evaluated.set(evaluated.get() + 1);
                Ok::<(), ValidationError>(())
            })
            .check(|| {
                evaluated.set(evaluated.get() + 1);
                Ok::<(), ValidationError>(())
            })
            .apply(
                || Ok::<i32, ValidationError>(42),
                |v| {
                    committed.set(Some(v));
                    Ok(v * 2)
                },
            );

        assert_eq!(result.unwrap(), 84);
        assert_eq!(evaluated.get(), 2);
        assert_eq!(committed.get(), Some(42));
    }

    #[test]
    fn first_failure_short_circuits_and_skips_commit() {
        let later_evaluated = Cell::new(false);
        let committed = Cell::new(false);

        let result = SettingsTransaction::new("test")
            .check(|| Ok::<(), ValidationError>(()))
            .check(|| Err(ValidationError::new("second", "second failed")))
            .check(|| {
                later_evaluated.set(true);
                Err(ValidationError::new("third", "third failed"))
            })
            .apply(
                || Ok::<(), ValidationError>(()),
                |_| {
                    committed.set(true);
                    Ok(())
                },
            );

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "second failed");
        assert!(!later_evaluated.get());
        assert!(!committed.get());
    }

    #[test]
    fn failed_validation_leaves_target_untouched() {
        let mut target = (1.0, 2.0);

        let result = SettingsTransaction::new("pair").apply(
            || -> Result<(f64, f64), ValidationError> {
                let first = "10".parse::<f64>().map_err(|_| ValidationError::new("first", "bad"))?;
                let second = "x".parse::<f64>().map_err(|_| {
                    ValidationError::new("second", "Cannot parse value for second.")
                })?;
                Ok((first, second))
            },
            |pair| {
                target = pair;
                Ok(())
            },
        );

        assert!(result.is_err());
        assert_eq!(target, (1.0, 2.0));
    }
}
