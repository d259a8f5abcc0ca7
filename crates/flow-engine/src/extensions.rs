//! Typed extension map for non-serializable dependency injection.
//!
//! `ExecutorExtensions` allows hosts to inject runtime objects (HTTP clients,
//! credential stores, etc.) into workflow execution. The scheduler passes the
//! same map to every `NodeExecutor` invocation of a run.
//!
//! # Example
//!
//! ```ignore
//! use flow_engine::{ExecutorExtensions, extension_keys};
//! use std::sync::Arc;
//!
//! let mut ext = ExecutorExtensions::new();
//! ext.set_credentials(Arc::new(my_vault));
//!
//! // In a NodeExecutor:
//! if let Some(key) = extensions.credential("etherscan.apiKey") {
//!     // ...
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque credential lookup supplied by the host
///
/// The engine never stores or interprets credentials; nodes ask for them by
/// name at execution time.
pub trait CredentialLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl CredentialLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Typed extension map for injecting non-serializable dependencies
/// into workflow execution.
///
/// Holds arbitrary `Send + Sync` types via `Box<dyn Any>`, keyed by name.
pub struct ExecutorExtensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutorExtensions {
    /// Create an empty extension map.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Insert a typed value under the given key.
    ///
    /// If a value already exists for this key, it is replaced.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// Get a reference to a typed value by key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    /// Check whether a key exists in the map.
    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Install the credential lookup under [`extension_keys::CREDENTIALS`].
    pub fn set_credentials(&mut self, credentials: Arc<dyn CredentialLookup>) {
        self.set(extension_keys::CREDENTIALS, credentials);
    }

    /// Resolve a credential by name through the installed lookup.
    pub fn credential(&self, name: &str) -> Option<String> {
        self.get::<Arc<dyn CredentialLookup>>(extension_keys::CREDENTIALS)
            .and_then(|c| c.lookup(name))
    }
}

impl Default for ExecutorExtensions {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-known extension keys for standard dependencies.
pub mod extension_keys {
    /// Key for `Arc<dyn CredentialLookup>`.
    pub const CREDENTIALS: &str = "credentials";
}
