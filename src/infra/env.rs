//! Process environment — implements the `EnvVars` port.

use crate::application::ports::EnvVars;

/// Reads the real process environment. Unset and empty variables both read
/// as `None`.
pub struct ProcessEnvVars;

impl EnvVars for ProcessEnvVars {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}
