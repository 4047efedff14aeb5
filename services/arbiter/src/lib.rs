//! Tutor Arbiter Library Crate
//!
//! This library contains the decision engine of the tutoring robot: the
//! producer queues, the task arbiter and its dispatch handlers, the session
//! registry, the emergency monitor, and the supervised runtime that ties them
//! together. The `arbiter` binary is a thin host around this library.

pub mod arbiter;
pub mod config;
pub mod emergency;
pub mod error;
pub mod lessons;
pub mod outbound;
pub mod queues;
pub mod registry;
pub mod runtime;
