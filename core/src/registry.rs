//! Registry of named circuit breakers
//!
//! The registry is the factory application code talks to. Each name maps to
//! one breaker, built lazily on the first [`create`](CircuitBreakerRegistry::create)
//! from, in order:
//!
//! 1. the default config supplier, called with the name
//! 2. config overrides registered for the name, in registration order
//! 3. global customizers, then customizers registered for the name
//!
//! The result is validated and frozen. Per-name overrides and customizers
//! must be registered before that name is first created; registering them
//! afterwards returns [`ConfigError::AlreadyConstructed`]. The default
//! supplier and global customizers may change at any time and only affect
//! breakers built later.
//!
//! Each name gets its own construction slot, so building one breaker never
//! holds up `create` or `get` for another name. Customizers run while the
//! registrations are locked for reading and must not call back into the same
//! registry.

use crate::{
    builder::CircuitBuilder,
    circuit::{CircuitBreaker, Config},
    clock::Clock,
    errors::ConfigError,
    settings::RegistrySettings,
};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Produces the starting config for a breaker name
pub type ConfigSupplier = Arc<dyn Fn(&str) -> Config + Send + Sync>;

/// Rewrites a config for one or more names
pub type ConfigMutator = Arc<dyn Fn(Config) -> Config + Send + Sync>;

/// Adjusts a breaker's builder just before it is built
pub type Customizer = Arc<dyn Fn(CircuitBuilder) -> CircuitBuilder + Send + Sync>;

struct Registrations {
    default_config: ConfigSupplier,
    overrides: HashMap<String, Vec<ConfigMutator>>,
    customizers: HashMap<String, Vec<Customizer>>,
    global_customizers: Vec<Customizer>,
    clock: Option<Arc<dyn Clock>>,
}

impl Registrations {
    fn builder_for(&self, name: &str) -> CircuitBuilder {
        let mut config = (self.default_config)(name);
        for mutate in self.overrides.get(name).into_iter().flatten() {
            config = mutate(config);
        }

        let mut builder = CircuitBuilder::new(name).config(config);
        if let Some(clock) = &self.clock {
            builder = builder.clock(Arc::clone(clock));
        }

        let named = self.customizers.get(name).into_iter().flatten();
        for customize in self.global_customizers.iter().chain(named) {
            builder = customize(builder);
        }
        builder
    }
}

/// Construction slot for one name; empty until the first successful build
type Slot = Arc<OnceCell<Arc<CircuitBreaker>>>;

/// Named circuit breakers, each built exactly once
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Slot>,
    registrations: RwLock<Registrations>,
}

impl CircuitBreakerRegistry {
    /// Empty registry using [`Config::default`] for every name
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
            registrations: RwLock::new(Registrations {
                default_config: Arc::new(|_| Config::default()),
                overrides: HashMap::new(),
                customizers: HashMap::new(),
                global_customizers: Vec::new(),
                clock: None,
            }),
        }
    }

    /// Registry whose breakers all read time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let registry = Self::new();
        registry.registrations.write().clock = Some(clock);
        registry
    }

    /// Registry configured from settings
    ///
    /// Every instance's merged configuration is validated up front, so a bad
    /// settings file fails here rather than on first use.
    pub fn from_settings(settings: &RegistrySettings) -> Result<Self, ConfigError> {
        let registry = Self::new();

        let defaults = settings.defaults.clone();
        let base = defaults.apply(Config::default());
        base.validate()?;
        registry.configure_default(move |_| base.clone());

        for (name, instance) in &settings.instances {
            instance
                .apply(defaults.apply(Config::default()))
                .validate()?;

            let instance = instance.clone();
            registry.configure(move |config| instance.apply(config), &[name.as_str()])?;
        }

        info!(
            instances = settings.instances.len(),
            "circuit breaker registry configured from settings"
        );
        Ok(registry)
    }

    /// Breaker for `name`, building it on first use
    ///
    /// Concurrent first calls for the same name build one instance and all
    /// observe it.
    pub fn create(&self, name: &str) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }

        // Held across construction so registrations cannot slip in between
        // building the config and publishing the breaker
        let registrations = self.registrations.read();

        // The shard lock is only held to fetch the slot
        let slot = Arc::clone(self.breakers.entry(name.to_string()).or_default().value());

        let breaker = slot.get_or_try_init(|| {
            let breaker = registrations.builder_for(name).build()?;
            info!(
                circuit = %name,
                timeout = ?breaker.config().timeout,
                failure_rate_threshold = breaker.config().failure_rate_threshold,
                "circuit breaker constructed"
            );
            Ok::<_, ConfigError>(Arc::new(breaker))
        })?;
        Ok(Arc::clone(breaker))
    }

    /// Breaker for `name` if it has been built
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(name)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Replace the default config supplier for breakers built from now on
    pub fn configure_default<F>(&self, supplier: F)
    where
        F: Fn(&str) -> Config + Send + Sync + 'static,
    {
        self.registrations.write().default_config = Arc::new(supplier);
        debug!("default circuit breaker config replaced");
    }

    /// Register a config override for each of `names`
    ///
    /// Nothing is registered if any of the names is already built.
    pub fn configure<F>(&self, mutator: F, names: &[&str]) -> Result<(), ConfigError>
    where
        F: Fn(Config) -> Config + Send + Sync + 'static,
    {
        let mut registrations = self.registrations.write();
        self.ensure_not_constructed(names)?;

        let mutator: ConfigMutator = Arc::new(mutator);
        for name in names {
            registrations
                .overrides
                .entry((*name).to_string())
                .or_default()
                .push(Arc::clone(&mutator));
        }
        Ok(())
    }

    /// Register a builder customizer for each of `names`
    ///
    /// Nothing is registered if any of the names is already built.
    pub fn add_customizer<F>(&self, customizer: F, names: &[&str]) -> Result<(), ConfigError>
    where
        F: Fn(CircuitBuilder) -> CircuitBuilder + Send + Sync + 'static,
    {
        let mut registrations = self.registrations.write();
        self.ensure_not_constructed(names)?;

        let customizer: Customizer = Arc::new(customizer);
        for name in names {
            registrations
                .customizers
                .entry((*name).to_string())
                .or_default()
                .push(Arc::clone(&customizer));
        }
        Ok(())
    }

    /// Register a customizer applied to every breaker built from now on
    pub fn add_global_customizer<F>(&self, customizer: F)
    where
        F: Fn(CircuitBuilder) -> CircuitBuilder + Send + Sync + 'static,
    {
        self.registrations
            .write()
            .global_customizers
            .push(Arc::new(customizer));
    }

    /// Forget the breaker for `name`; the next `create` builds a fresh one
    ///
    /// Holders of the removed `Arc` keep a working, detached breaker.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        let _registrations = self.registrations.write();
        let removed = self
            .breakers
            .remove(name)
            .and_then(|(_, slot)| slot.get().cloned());
        if removed.is_some() {
            info!(circuit = %name, "circuit breaker removed from registry");
        }
        removed
    }

    /// Names of all built breakers, in no particular order
    pub fn names(&self) -> Vec<String> {
        self.breakers
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_not_constructed(&self, names: &[&str]) -> Result<(), ConfigError> {
        let built = |name: &str| {
            self.breakers
                .get(name)
                .is_some_and(|slot| slot.value().get().is_some())
        };

        match names.iter().find(|name| built(name)) {
            Some(name) => Err(ConfigError::AlreadyConstructed {
                circuit: (*name).to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.names())
            .finish()
    }
}
