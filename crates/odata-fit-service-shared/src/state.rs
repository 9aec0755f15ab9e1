//! Application state for the fixture service.
//!
//! This module provides the shared state structure that axum handlers use to
//! reach the fixture store, the batch processor and the responses parked for
//! the async monitor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use odata_fit_lib::{
    BatchProcessor, EntityService, Error as LibError, FixtureStore, HttpDispatcher, InnerResponse,
    ProtocolVersion,
};
use url::Url;
use uuid::Uuid;

use crate::config::ServiceConfig;

/// Error during application state initialization.
#[derive(Debug)]
pub enum AppStateError {
    /// The fixture root directory does not exist.
    FixturesNotFound(String),

    /// The loopback HTTP client could not be built.
    Dispatcher(LibError),

    /// A service root could not be derived from the base URL.
    InvalidBaseUrl(String),
}

impl std::fmt::Display for AppStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixturesNotFound(path) => write!(f, "fixture root not found: {}", path),
            Self::Dispatcher(e) => write!(f, "failed to build batch dispatcher: {}", e),
            Self::InvalidBaseUrl(url) => write!(f, "invalid base url: {}", url),
        }
    }
}

impl std::error::Error for AppStateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dispatcher(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LibError> for AppStateError {
    fn from(err: LibError) -> Self {
        match err {
            LibError::FixtureRootNotFound { path } => {
                Self::FixturesNotFound(path.display().to_string())
            }
            other => Self::Dispatcher(other),
        }
    }
}

/// Shared application state for all axum handlers.
///
/// This struct is cheaply cloneable (using `Arc` internally) and should be
/// shared via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: FixtureStore,
    base_url: Url,
    roots: HashMap<ProtocolVersion, Url>,
    batch: BatchProcessor<HttpDispatcher>,
    pending: Mutex<HashMap<String, InnerResponse>>,
}

impl AppState {
    /// Build application state from configuration.
    ///
    /// Fails when the fixture root does not exist.
    pub fn load(config: &ServiceConfig) -> Result<Self, AppStateError> {
        tracing::info!(path = %config.fixtures_path.display(), "opening fixture store");
        let store = FixtureStore::open(&config.fixtures_path)?;

        for version in ProtocolVersion::ALL {
            let sets = store.entity_sets(version)?;
            tracing::info!(
                prefix = version.prefix(),
                entity_sets = sets.len(),
                "fixtures discovered"
            );
        }

        let dispatcher = HttpDispatcher::new(config.credentials.clone())?;
        Self::from_components(store, config.base_url.clone(), dispatcher)
    }

    /// Create application state from pre-built components.
    ///
    /// `base_url` must end in `/`; each version is served below it.
    pub fn from_components(
        store: FixtureStore,
        base_url: Url,
        dispatcher: HttpDispatcher,
    ) -> Result<Self, AppStateError> {
        let mut roots = HashMap::new();
        for version in ProtocolVersion::ALL {
            let root = base_url
                .join(&format!("{}/", version.prefix()))
                .map_err(|e| AppStateError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
            roots.insert(version, root);
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                store,
                base_url,
                roots,
                batch: BatchProcessor::new(dispatcher),
                pending: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Access the fixture store.
    pub fn store(&self) -> &FixtureStore {
        &self.inner.store
    }

    /// Entity operations for one version.
    pub fn entities(&self, version: ProtocolVersion) -> EntityService<'_> {
        EntityService::new(&self.inner.store, version)
    }

    /// Base URL of the service.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Service root of a version, e.g. `http://localhost:8080/V40/`.
    pub fn service_root(&self, version: ProtocolVersion) -> &Url {
        // Every version is inserted by `from_components`.
        &self.inner.roots[&version]
    }

    /// Processor replaying batches against this service.
    pub fn batch_processor(&self) -> &BatchProcessor<HttpDispatcher> {
        &self.inner.batch
    }

    /// Store a finished response for the async monitor and return its token.
    pub fn park_response(&self, response: InnerResponse) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.pending().insert(token.clone(), response);
        token
    }

    /// Remove and return a parked response.
    pub fn take_response(&self, token: &str) -> Option<InnerResponse> {
        self.pending().remove(token)
    }

    /// Number of responses waiting to be collected.
    pub fn pending_responses(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, InnerResponse>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("fixtures", &self.inner.store.root())
            .field("base_url", &self.inner.base_url.as_str())
            .field("pending_responses", &self.pending_responses())
            .finish()
    }
}
