use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::FireEyeConfig;

use super::backend::DetectorBackend;
use super::backends::StubBackend;

pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Named detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct BackendRegistry {
    backends: BTreeMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the backends this build supports and select `cfg.backend`.
///
/// The tract backend loads its model eagerly, so it is only constructed when
/// it is the configured backend.
pub fn build_registry(cfg: &FireEyeConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    match cfg.backend.as_str() {
        "stub" => {}
        "tract" => register_tract(&mut registry, cfg)?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    }
    registry.register(StubBackend::new(cfg.detector.class_names.clone()));
    registry.set_default(&cfg.backend)?;
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, cfg: &FireEyeConfig) -> Result<()> {
    let backend = super::backends::TractBackend::new(&cfg.detector.model_path, &cfg.detector)?;
    registry.register(backend);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, _cfg: &FireEyeConfig) -> Result<()> {
    Err(anyhow!(
        "detector backend 'tract' requires the backend-tract feature"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_backend_is_default() {
        let mut registry = BackendRegistry::new();
        assert!(registry.default_backend().is_none());
        registry.register(StubBackend::new(vec!["ToolBox".into()]));
        assert_eq!(registry.default_name(), Some("stub"));
        assert!(registry.default_backend().is_some());
        assert_eq!(registry.list(), vec!["stub".to_string()]);
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new(Vec::new()));
        let err = registry.set_default("onnx").unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn build_registry_selects_stub() {
        let mut cfg = FireEyeConfig::default();
        cfg.backend = "stub".to_string();
        let registry = build_registry(&cfg).unwrap();
        let backend = registry.default_backend().unwrap();
        let guard = backend.lock().unwrap();
        assert_eq!(guard.name(), "stub");
        assert_eq!(guard.class_names(), cfg.detector.class_names.as_slice());
    }

    #[test]
    fn build_registry_rejects_unknown_backend() {
        let mut cfg = FireEyeConfig::default();
        cfg.backend = "opencv".to_string();
        assert!(build_registry(&cfg).is_err());
    }

    #[cfg(feature = "backend-tract")]
    #[test]
    fn default_config_reaches_the_model_loader() {
        let mut cfg = FireEyeConfig::default();
        assert_eq!(cfg.backend, "tract");
        let dir = tempfile::tempdir().unwrap();
        cfg.detector.model_path = dir.path().join("best.onnx");

        let message = format!("{:#}", build_registry(&cfg).err().unwrap());
        assert!(message.contains("failed to load ONNX model"), "{message}");
        assert!(!message.contains("requires the backend-tract feature"));
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_without_feature_names_the_feature() {
        let cfg = FireEyeConfig::default();
        let message = build_registry(&cfg).err().unwrap().to_string();
        assert!(message.contains("requires the backend-tract feature"));
    }
}
