//! Application layer — port contracts, the saga executor, the readiness
//! protocols, and the lifecycle orchestrators.
//!
//! Imports from `crate::domain` are allowed; imports from `crate::infra`,
//! `crate::commands`, or `crate::output` are forbidden.

pub mod bootstrap;
pub mod ports;
pub mod saga;
pub mod services;
pub mod waiter;
