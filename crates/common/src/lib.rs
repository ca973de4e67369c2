//! Common types for the certwarden certificate lifecycle scheduler.
//!
//! Shared between the configuration crate and the scheduler:
//!
//! - [`ids`]: identifier newtypes
//! - [`types`]: closed vocabularies (instance states, certificate kinds,
//!   execution mode)
//! - [`model`]: certificate and instance records as persisted by the store

pub mod ids;
pub mod model;
pub mod types;

pub use ids::{CertName, InstanceId, PassId};
pub use model::{CertInstance, Certificate, NewInstance};
pub use types::{CertType, ExecutionMode, InstanceState, ParseEnumError, SubjectType};
