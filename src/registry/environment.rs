// Execution host environment access

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// Environment of the host the build actually runs on.
///
/// This may be a remote agent, so lookups are async and fallible.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// Look up a variable. `Ok(None)` means the host answered and the
    /// variable is unset; `Err` means the host could not be queried.
    async fn var(&self, key: &str) -> Result<Option<String>>;
}

/// Environment of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEnvironment;

#[async_trait]
impl HostEnvironment for LocalEnvironment {
    async fn var(&self, key: &str) -> Result<Option<String>> {
        Ok(env_var_non_empty(key))
    }
}

/// Fixed set of variables captured ahead of time, e.g. an agent's
/// environment snapshot handed over by a CI controller.
#[derive(Debug, Default, Clone)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
}

impl StaticEnvironment {
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl HostEnvironment for StaticEnvironment {
    async fn var(&self, key: &str) -> Result<Option<String>> {
        Ok(self.vars.get(key).filter(|v| !v.is_empty()).cloned())
    }
}

/// Read an environment variable, treating empty strings as if the variable is not set.
pub(crate) fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_environment_treats_empty_as_unset() {
        let env = StaticEnvironment::default()
            .with_var("HOME", "/home/jenkins")
            .with_var("EMPTY", "");

        assert_eq!(
            env.var("HOME").await.unwrap().as_deref(),
            Some("/home/jenkins")
        );
        assert_eq!(env.var("EMPTY").await.unwrap(), None);
        assert_eq!(env.var("MISSING").await.unwrap(), None);
    }
}
