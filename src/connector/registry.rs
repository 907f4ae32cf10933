use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::connector::config::ConnectorConfig;
use crate::connector::constants::REGISTRY_TARGET;
use crate::connector::error::ConfigError;
use crate::connector::request::Request;
use crate::connector::resolver::{Destination, Resolver};
use crate::connector::runtime::util::join_path;
use crate::connector::runtime::Connector;
use crate::connector::transport::{Transport, UreqTransport};

/// Cache key for a connector: service id plus endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    pub service_id: String,
    pub function: String,
}

impl DestinationKey {
    pub fn new<S: Into<String>, F: Into<String>>(service_id: S, function: F) -> Self {
        Self {
            service_id: service_id.into(),
            function: function.into(),
        }
    }
}

impl std::fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.service_id, self.function)
    }
}

/// Connector registry owned by the application. At most one connector exists per key.
pub struct ConnectorRegistry {
    config: ConnectorConfig,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    connectors: Mutex<HashMap<DestinationKey, Arc<Connector>>>,
}

impl ConnectorRegistry {
    pub fn new(
        config: ConnectorConfig,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            runtime,
            connectors: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_ureq(config: ConnectorConfig, runtime: Handle) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(UreqTransport::new()), runtime)
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Looks up or creates the connector. Returns `None` and caches nothing when resolution fails.
    pub fn get_or_create(
        &self,
        key: &DestinationKey,
        resolver: &dyn Resolver,
    ) -> Option<Arc<Connector>> {
        let mut connectors = self.lock_connectors();
        if let Some(existing) = connectors.get(key) {
            return Some(Arc::clone(existing));
        }

        // Resolution runs under the lock so concurrent callers cannot both create a connector.
        let destination = match resolver.resolve(&key.service_id) {
            Ok(destination) => destination,
            Err(err) => {
                warn!(
                    target: REGISTRY_TARGET,
                    key = %key,
                    %err,
                    "failed to resolve destination"
                );
                return None;
            }
        };

        let destination = Destination {
            url: join_path(&destination.url, &key.function),
            ..destination
        };
        info!(
            target: REGISTRY_TARGET,
            key = %key,
            url = %destination.url,
            "creating connector"
        );

        let connector = Connector::new(
            destination,
            &self.config,
            Arc::clone(&self.transport),
            self.runtime.clone(),
        );
        connectors.insert(key.clone(), Arc::clone(&connector));
        Some(connector)
    }

    /// Returns false synchronously when resolution fails; the callback is then never invoked.
    pub fn dispatch(&self, key: &DestinationKey, resolver: &dyn Resolver, request: Request) -> bool {
        match self.get_or_create(key, resolver) {
            Some(connector) => connector.send(request),
            None => false,
        }
    }

    /// Clears the cache. Existing connectors keep draining but can no longer be looked up.
    pub fn flush_all(&self) {
        let flushed = {
            let mut connectors = self.lock_connectors();
            let count = connectors.len();
            connectors.clear();
            count
        };
        info!(target: REGISTRY_TARGET, flushed, "flushed connector registry");
    }

    pub fn len(&self) -> usize {
        self.lock_connectors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_connectors(&self) -> MutexGuard<'_, HashMap<DestinationKey, Arc<Connector>>> {
        self.connectors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("config", &self.config)
            .field("connectors", &self.len())
            .finish_non_exhaustive()
    }
}
