//! Host facade
//!
//! `Interface` owns everything compiled units share: the type
//! registry, the style store, compile limits and the process-wide
//! caches (instantiators by source identity, inline handlers by body
//! text). Compilation of distinct units may run concurrently; the
//! caches tolerate idempotent concurrent miss-fills.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::error::AmlError;
use crate::handler::CompiledHandler;
use crate::instantiator::Instantiator;
use crate::limits::CompileLimits;
use crate::markup::Element;
use crate::registry::TypeRegistry;
use crate::style::StyleStore;

/// Shared host state for compilation and instantiation
pub struct Interface {
    registry: Arc<TypeRegistry>,
    styles: StyleStore,
    limits: CompileLimits,
    /// Compiled units, keyed by source text — repeat use never re-parses
    units: DashMap<String, Arc<Instantiator>>,
    /// Compiled template sub-units, same keying
    templates: DashMap<String, Arc<Instantiator>>,
    /// Inline handlers, keyed by body text, shared across units
    handlers: DashMap<String, Arc<CompiledHandler>>,
    /// Directories searched for `Template`/`ItemTemplate` paths
    search_paths: RwLock<Vec<PathBuf>>,
}

impl Interface {
    /// Host with the builtin widget vocabulary and default limits
    pub fn new() -> Arc<Interface> {
        Self::with_registry(Arc::new(TypeRegistry::with_builtins()), CompileLimits::default())
    }

    pub fn with_registry(registry: Arc<TypeRegistry>, limits: CompileLimits) -> Arc<Interface> {
        Arc::new(Interface {
            registry,
            styles: StyleStore::new(),
            limits,
            units: DashMap::new(),
            templates: DashMap::new(),
            handlers: DashMap::new(),
            search_paths: RwLock::new(vec![PathBuf::from(".")]),
        })
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn styles(&self) -> &StyleStore {
        &self.styles
    }

    pub fn limits(&self) -> &CompileLimits {
        &self.limits
    }

    pub fn add_search_path(&self, dir: impl Into<PathBuf>) {
        self.search_paths.write().unwrap().push(dir.into());
    }

    // ─────────────────────────────────────────────────────────────
    // Compilation entry points
    // ─────────────────────────────────────────────────────────────

    /// Compile one markup unit from YAML text, memoized by source
    /// identity. Nothing is cached for a unit that fails.
    pub fn compile_str(
        self: &Arc<Self>,
        unit: &str,
        yaml: &str,
    ) -> Result<Arc<Instantiator>, AmlError> {
        if let Some(cached) = self.units.get(yaml) {
            return Ok(Arc::clone(&cached));
        }
        let element = Element::from_yaml_str(yaml, &self.limits)
            .map_err(|e| e.in_unit(unit))?;
        let compiled = Instantiator::compile(self, unit, &element)?;
        self.units.insert(yaml.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Compile a markup unit from a file, memoized by content
    pub fn load_file(self: &Arc<Self>, path: &Path) -> Result<Arc<Instantiator>, AmlError> {
        let yaml = std::fs::read_to_string(path)?;
        self.compile_str(&path.display().to_string(), &yaml)
    }

    /// Compile a template sub-unit from YAML text
    pub fn compile_template_str(
        self: &Arc<Self>,
        unit: &str,
        yaml: &str,
    ) -> Result<Arc<Instantiator>, AmlError> {
        if let Some(cached) = self.templates.get(yaml) {
            return Ok(Arc::clone(&cached));
        }
        let element = Element::from_yaml_str(yaml, &self.limits)
            .map_err(|e| e.in_unit(unit))?;
        let compiled = Instantiator::compile_template(self, unit, &element)?;
        self.templates.insert(yaml.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Resolve a `Template`/`ItemTemplate` path against the search
    /// paths and compile it as a template sub-unit
    pub fn load_template(self: &Arc<Self>, path: &str) -> Result<Arc<Instantiator>, AmlError> {
        let candidate = {
            let search_paths = self.search_paths.read().unwrap();
            let direct = PathBuf::from(path);
            if direct.is_file() {
                Some(direct)
            } else {
                search_paths
                    .iter()
                    .map(|dir| dir.join(path))
                    .find(|p| p.is_file())
            }
        };
        let Some(file) = candidate else {
            return Err(AmlError::UnknownTemplate {
                path: path.to_string(),
            });
        };
        let yaml = std::fs::read_to_string(&file)?;
        self.compile_template_str(path, &yaml)
    }

    /// Compile (or fetch) an inline handler, shared across units
    pub fn compile_handler(&self, body: &str) -> Result<Arc<CompiledHandler>, AmlError> {
        if let Some(cached) = self.handlers.get(body) {
            return Ok(Arc::clone(&cached));
        }
        let compiled = CompiledHandler::compile(body, &self.limits)?;
        self.handlers.insert(body.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    // ─────────────────────────────────────────────────────────────
    // Tooling introspection and cache control
    // ─────────────────────────────────────────────────────────────

    pub fn unit_cache_len(&self) -> usize {
        self.units.len()
    }

    pub fn template_cache_len(&self) -> usize {
        self.templates.len()
    }

    pub fn handler_cache_len(&self) -> usize {
        self.handlers.len()
    }

    /// Drop every process-wide cache (hot reload, tests)
    pub fn reset_caches(&self) {
        self.units.clear();
        self.templates.clear();
        self.handlers.clear();
        self.registry.reset_caches();
        self.styles.reset_caches();
    }
}
