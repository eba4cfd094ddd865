//! Backend registration.
//!
//! Backends are registered on an explicit [`BackendRegistry`] built at
//! program start and handed to whoever creates contexts. Dispatch is by URI
//! prefix: `local:` selects the local backend, and so on.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::context::{Context, ContextParams, ScanResult};
use crate::error::{IioError, Result};

/// A source of contexts.
pub trait Backend: Send + Sync {
    /// Short backend name, e.g. `local`.
    fn name(&self) -> &'static str;

    /// URI prefix including the colon, e.g. `local:`.
    fn uri_prefix(&self) -> &'static str;

    /// Timeout applied when the caller does not pick one.
    fn default_timeout_ms(&self) -> u32;

    /// Enumerate the contexts this backend can create.
    fn scan(&self, params: &ContextParams, args: &str) -> Result<Vec<ScanResult>>;

    /// Discover devices and build a context. `args` is the URI without the
    /// prefix.
    fn create_context(&self, params: &ContextParams, args: &str) -> Result<Context>;
}

/// Registered backends.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<Vec<Arc<dyn Backend>>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. A backend with the same URI prefix is replaced.
    pub fn register(&self, backend: Arc<dyn Backend>) {
        let mut backends = self.backends.write();
        if let Some(slot) = backends
            .iter_mut()
            .find(|b| b.uri_prefix() == backend.uri_prefix())
        {
            warn!(backend = backend.name(), "Replacing registered backend");
            *slot = backend;
        } else {
            debug!(backend = backend.name(), "Registered backend");
            backends.push(backend);
        }
    }

    /// Names of registered backends in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.read().iter().map(|b| b.name()).collect()
    }

    /// Backend handling a URI.
    pub fn find_for_uri(&self, uri: &str) -> Option<Arc<dyn Backend>> {
        self.backends
            .read()
            .iter()
            .find(|b| uri.starts_with(b.uri_prefix()))
            .cloned()
    }

    /// Create a context for a URI.
    pub fn create_context(&self, uri: &str, params: &ContextParams) -> Result<Context> {
        let backend = self.find_for_uri(uri).ok_or_else(|| IioError::NotFound {
            what: format!("backend for URI '{}'", uri),
        })?;
        let args = &uri[backend.uri_prefix().len()..];
        backend.create_context(params, args)
    }

    /// Scan every registered backend. Backends that fail are skipped.
    pub fn scan(&self, params: &ContextParams) -> Vec<ScanResult> {
        let backends = self.backends.read().clone();
        let mut results = Vec::new();
        for backend in backends {
            match backend.scan(params, "") {
                Ok(found) => results.extend(found),
                Err(e) => warn!(backend = backend.name(), error = %e, "Backend scan failed"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AttrIo, AttrScope};
    use crate::device::Device;

    #[derive(Debug)]
    struct NullIo;

    impl AttrIo for NullIo {
        fn read_attr(&self, _: &Device, _: AttrScope, filename: &str) -> Result<String> {
            Err(IioError::NotFound {
                what: filename.to_string(),
            })
        }

        fn write_attr(&self, _: &Device, _: AttrScope, _: &str, _: &str) -> Result<usize> {
            Err(IioError::not_supported("write"))
        }
    }

    struct FakeBackend;

    impl Backend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn uri_prefix(&self) -> &'static str {
            "fake:"
        }

        fn default_timeout_ms(&self) -> u32 {
            250
        }

        fn scan(&self, _: &ContextParams, _: &str) -> Result<Vec<ScanResult>> {
            Ok(vec![ScanResult {
                description: "fake devices".into(),
                uri: "fake:".into(),
            }])
        }

        fn create_context(&self, params: &ContextParams, args: &str) -> Result<Context> {
            Ok(Context::builder(format!("fake {}", args), Arc::new(NullIo))
                .timeout_ms(params.resolve_timeout(self.default_timeout_ms()))
                .build())
        }
    }

    #[test]
    fn test_dispatch_by_prefix() {
        let registry = BackendRegistry::new();
        registry.register(Arc::new(FakeBackend));

        let ctx = registry
            .create_context("fake:board", &ContextParams::default())
            .unwrap();
        assert_eq!(ctx.description(), "fake board");
        assert_eq!(ctx.timeout_ms(), 250);

        let err = registry
            .create_context("usb:1.2", &ContextParams::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_register_replaces_same_prefix() {
        let registry = BackendRegistry::new();
        registry.register(Arc::new(FakeBackend));
        registry.register(Arc::new(FakeBackend));
        assert_eq!(registry.names(), ["fake"]);
        assert_eq!(registry.scan(&ContextParams::default()).len(), 1);
    }
}
