use std::sync::Arc;

use anyhow::{Context, Result};
use pruner_store::CatalogStore;

use crate::config::{Config, GlobalOptions};
use crate::effects::{ConsoleUserResolver, Effects, ProcessRunner, SharedEffects, SystemEffects};

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Creates a context from the process environment with system effects.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be prepared.
    pub fn new(global: &'a GlobalOptions) -> Result<Self> {
        let config = Config::from_env()?;
        let effects: SharedEffects = Arc::new(SystemEffects::new(&config));
        Ok(Self::with_parts(global, config, effects))
    }

    pub fn with_parts(global: &'a GlobalOptions, config: Config, effects: SharedEffects) -> Self {
        Self {
            global,
            config,
            effects,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn console_user(&self) -> &dyn ConsoleUserResolver {
        self.effects.console_user()
    }

    pub fn process(&self) -> &dyn ProcessRunner {
        self.effects.process()
    }

    /// Opens the catalog store at the configured cache root.
    ///
    /// # Errors
    /// Returns an error if the catalog URL is invalid or the HTTP client cannot be built.
    pub fn store(&self) -> Result<CatalogStore> {
        CatalogStore::new(self.config.store_settings()).with_context(|| {
            format!(
                "unable to open catalog cache at {}",
                self.config.catalog().cache.path.display()
            )
        })
    }
}
