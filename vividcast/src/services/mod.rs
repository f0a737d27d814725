//! Service layer module.
//!
//! Provides the service container and initialization logic for all
//! application services.

pub mod container;

pub use container::ServiceContainer;
