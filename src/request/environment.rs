//! Environments a request can be evaluated in.

use std::fmt;

use crate::config;
use crate::error::{IndirectorError, Result};

/// A resolved environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Environment {
    name: String,
}

impl Environment {
    /// Resolve an environment by name.
    ///
    /// Names are lowercase alphanumerics and underscores.
    pub fn resolve(name: &str) -> Result<Self> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(IndirectorError::Argument(format!(
                "Invalid environment name '{}'",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// The environment named by the current settings.
    pub fn current() -> Result<Self> {
        Self::resolve(&config::current().environment)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(Environment::resolve("production").unwrap().name(), "production");
        assert!(Environment::resolve("Bad-Name").unwrap_err().is_argument());
        assert!(Environment::resolve("").is_err());
    }

    #[test]
    fn test_current_follows_settings() {
        let mut settings = config::Settings::default();
        settings.environment = "staging".to_string();
        let _guard = config::override_for_thread(settings);
        assert_eq!(Environment::current().unwrap().name(), "staging");
    }
}
