//! Automation of the join and leave protocols.
//!
//! A group's [`Stage`] is persisted with the group. [`machine::step`] performs the work of the
//! current stage and moves the group to the next one; the [`scheduler::Scheduler`] calls it
//! periodically for every started group when running as a daemon.

pub mod machine;
pub mod scheduler;
pub mod stage;

pub use machine::step;
pub use scheduler::Scheduler;
pub use stage::Stage;
