//! Task admission, dispatch and lifecycle.

pub mod queue;
pub mod recovery;
pub mod service;

pub use queue::DispatchQueue;
pub use recovery::RecoveryReport;
pub use service::Scheduler;
