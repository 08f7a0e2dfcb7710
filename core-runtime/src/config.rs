//! # Core Configuration Module
//!
//! Provides configuration management for the routing core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `CoreConfig` instance holding the bridge implementations and timing
//! settings the routing core needs. It enforces fail-fast validation to
//! ensure all required bridges are provided before initialization.
//!
//! ## Required Dependencies
//!
//! - `NetworkActivator` - Required; there is no portable default for the
//!   platform's network-activation API
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `ExecutorFactory` - Call execution (desktop default: reqwest-backed,
//!   with the `desktop-shims` feature)
//! - `UsageRecorder` - Usage accounting (default: tracing-backed recorder)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .activator(Arc::new(MyPlatformActivator))
//!     .wait_ceiling(Duration::from_secs(5))
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{ExecutorFactory, LogUsageRecorder, NetworkActivator, UsageRecorder};
use std::sync::Arc;
use std::time::Duration;

/// Default ceiling on a caller's wait for high-bandwidth activation.
pub const DEFAULT_WAIT_CEILING: Duration = Duration::from_secs(5);

/// Default bound on the platform's own network-activation time.
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default grace window before a lost interface is purged from the inventory.
pub const DEFAULT_LOST_GRACE: Duration = Duration::from_secs(5);

/// Core configuration for the routing core.
///
/// This struct holds all dependencies and settings required to initialize
/// the request router. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Platform network-activation API (required)
    pub activator: Arc<dyn NetworkActivator>,

    /// Factory for network-bound call executors
    pub executor_factory: Arc<dyn ExecutorFactory>,

    /// Usage statistics sink
    pub usage_recorder: Arc<dyn UsageRecorder>,

    /// Ceiling on a caller's wait for high-bandwidth activation
    pub wait_ceiling: Duration,

    /// Bound on the platform's own activation time
    pub activation_timeout: Duration,

    /// Grace window before a lost interface is purged
    pub lost_grace: Duration,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("activator", &"NetworkActivator { ... }")
            .field("executor_factory", &"ExecutorFactory { ... }")
            .field("usage_recorder", &"UsageRecorder { ... }")
            .field("wait_ceiling", &self.wait_ceiling)
            .field("activation_timeout", &self.activation_timeout)
            .field("lost_grace", &self.lost_grace)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Timeouts are non-zero
    /// - The caller wait ceiling does not exceed the platform activation
    ///   bound (a longer wait could never be satisfied)
    pub fn validate(&self) -> Result<()> {
        if self.wait_ceiling.is_zero() {
            return Err(Error::Config(
                "Wait ceiling must be greater than zero".to_string(),
            ));
        }

        if self.activation_timeout.is_zero() {
            return Err(Error::Config(
                "Activation timeout must be greater than zero".to_string(),
            ));
        }

        if self.lost_grace.is_zero() {
            return Err(Error::Config(
                "Lost-interface grace window must be greater than zero".to_string(),
            ));
        }

        if self.wait_ceiling > self.activation_timeout {
            return Err(Error::Config(format!(
                "Wait ceiling ({:?}) exceeds the platform activation timeout ({:?}); \
                 callers would always give up first",
                self.wait_ceiling, self.activation_timeout
            )));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_executor_factory() -> Result<Arc<dyn ExecutorFactory>> {
    use bridge_desktop::ReqwestExecutorFactory;

    let factory: Arc<dyn ExecutorFactory> = Arc::new(ReqwestExecutorFactory::new());
    Ok(factory)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_executor_factory() -> Result<Arc<dyn ExecutorFactory>> {
    Err(Error::CapabilityMissing {
        capability: "ExecutorFactory".to_string(),
        message: "ExecutorFactory implementation is required for call execution. \
                 Desktop: enable the 'desktop-shims' feature to use the default \
                 reqwest-backed factory. \
                 Wearable/Mobile: inject a platform-native HTTP engine adapter."
            .to_string(),
    })
}

fn activator_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "NetworkActivator".to_string(),
        message: "NetworkActivator implementation is required for high-bandwidth \
                 network requests. Inject the platform connectivity-service adapter, \
                 or a stub activator on hosts without one."
            .to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then call
/// [`build()`](CoreConfigBuilder::build) to create the final config. The
/// builder validates required dependencies and provides helpful error
/// messages.
#[derive(Default)]
pub struct CoreConfigBuilder {
    activator: Option<Arc<dyn NetworkActivator>>,
    executor_factory: Option<Arc<dyn ExecutorFactory>>,
    usage_recorder: Option<Arc<dyn UsageRecorder>>,
    wait_ceiling: Option<Duration>,
    activation_timeout: Option<Duration>,
    lost_grace: Option<Duration>,
}

impl CoreConfigBuilder {
    /// Sets the network activator implementation (required).
    ///
    /// The activator is the platform API that brings up a transient
    /// high-bandwidth network on demand.
    pub fn activator(mut self, activator: Arc<dyn NetworkActivator>) -> Self {
        self.activator = Some(activator);
        self
    }

    /// Sets the executor factory implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn executor_factory(mut self, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.executor_factory = Some(factory);
        self
    }

    /// Sets the usage recorder implementation.
    ///
    /// Defaults to the tracing-backed recorder.
    pub fn usage_recorder(mut self, recorder: Arc<dyn UsageRecorder>) -> Self {
        self.usage_recorder = Some(recorder);
        self
    }

    /// Sets the ceiling on a caller's wait for high-bandwidth activation.
    ///
    /// Default: 5 seconds
    pub fn wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.wait_ceiling = Some(ceiling);
        self
    }

    /// Sets the bound on the platform's own activation time.
    ///
    /// Default: 30 seconds
    pub fn activation_timeout(mut self, timeout: Duration) -> Self {
        self.activation_timeout = Some(timeout);
        self
    }

    /// Sets the grace window before a lost interface is purged.
    ///
    /// Default: 5 seconds
    pub fn lost_grace(mut self, grace: Duration) -> Self {
        self.lost_grace = Some(grace);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// This validates all required dependencies are provided and returns an
    /// error with an actionable message if anything is missing.
    pub fn build(self) -> Result<CoreConfig> {
        let activator = self.activator.ok_or_else(activator_missing_error)?;

        let executor_factory = match self.executor_factory {
            Some(factory) => factory,
            None => provide_default_executor_factory()?,
        };

        let usage_recorder = self
            .usage_recorder
            .unwrap_or_else(|| Arc::new(LogUsageRecorder));

        let config = CoreConfig {
            activator,
            executor_factory,
            usage_recorder,
            wait_ceiling: self.wait_ceiling.unwrap_or(DEFAULT_WAIT_CEILING),
            activation_timeout: self.activation_timeout.unwrap_or(DEFAULT_ACTIVATION_TIMEOUT),
            lost_grace: self.lost_grace.unwrap_or(DEFAULT_LOST_GRACE),
        };

        config.validate()?;

        Ok(config)
    }
}
