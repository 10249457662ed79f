//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! cloud CLI provider, SSH remote execution, filesystem state, and network
//! probing.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod cloud;
pub mod command_runner;
pub mod env;
pub mod fs;
pub mod network;
pub mod remote;
pub mod state;
