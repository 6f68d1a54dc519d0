// Control loop: the PID controller, bound generator/feedback functions,
// the periodic scheduler and the lifecycle state machine that owns them.
pub mod pid;
pub mod function;
pub mod scheduler;
pub mod lifecycle;
