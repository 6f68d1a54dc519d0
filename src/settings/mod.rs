// Settings: value objects, field validation and the two-phase commit
// used by every settings command.
pub mod values;
pub mod validator;
pub mod transaction;
