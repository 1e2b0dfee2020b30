use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::ModelBackend;

/// Everything a backend factory needs to build a model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSettings {
    pub input_width: u32,
    pub input_height: u32,
    pub model_path: Option<String>,
}

type BackendFactory = Box<dyn Fn(&ModelSettings) -> Result<Box<dyn ModelBackend>>>;

/// Named backend factories.
///
/// Backends are constructed on demand because each scheduler owns exactly
/// one backend for its whole lifetime.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", |settings| {
            Ok(Box::new(super::StubBackend::new(
                settings.input_width,
                settings.input_height,
            )))
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let path = settings
                .model_path
                .as_deref()
                .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
            Ok(Box::new(super::backends::TractBackend::new(
                path,
                settings.input_width,
                settings.input_height,
            )?))
        });
        registry
    }

    /// Register a factory. The first registered backend becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ModelSettings) -> Result<Box<dyn ModelBackend>> + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a backend by name.
    pub fn create(&self, name: &str, settings: &ModelSettings) -> Result<Box<dyn ModelBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        factory(settings)
    }

    pub fn create_default(&self, settings: &ModelSettings) -> Result<Box<dyn ModelBackend>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no backends registered"))?;
        self.create(name, settings)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ModelSettings {
        ModelSettings {
            input_width: 32,
            input_height: 32,
            model_path: None,
        }
    }

    #[test]
    fn builtin_registry_builds_stub() {
        let registry = BackendRegistry::with_builtin();
        let backend = registry.create("stub", &settings()).unwrap();
        assert_eq!(backend.name(), "stub");
        assert_eq!(backend.input_size(), (32, 32));
        assert_eq!(registry.create_default(&settings()).unwrap().name(), "stub");
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let mut registry = BackendRegistry::with_builtin();
        assert!(registry.create("onnx-gpu", &settings()).is_err());
        assert!(registry.set_default("onnx-gpu").is_err());
    }
}
