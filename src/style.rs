//! Style sheets and cached default-value loaders
//!
//! A style sheet is a string-keyed map of member defaults:
//!
//! ```yaml
//! PanelTitle:
//!   FontSize: "18"
//! Label:
//!   FontSize: "12"
//! ```
//!
//! At compile time each element resolves one `DefaultsLoader`: its
//! type-declared defaults overlaid with the first matching style —
//! explicit `Style` key first, else the type name, else base-chain
//! type names. The loader (members pre-converted) is cached per key so
//! later instantiations skip every lookup.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::convert;
use crate::error::AmlError;
use crate::registry::{TypeDescriptor, TypeRegistry};

/// Pre-converted member defaults for one (style key, type) pair
#[derive(Debug)]
pub struct DefaultsLoader {
    pub entries: Vec<(String, Value)>,
}

/// String-keyed style lookup with a loader cache
#[derive(Default)]
pub struct StyleStore {
    sheets: DashMap<String, Arc<Vec<(String, String)>>>,
    loaders: DashMap<(String, Arc<str>), Arc<DefaultsLoader>>,
}

impl StyleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one style sheet; later loads replace same-named keys
    pub fn load_str(&self, yaml: &str) -> Result<(), AmlError> {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let Some(mapping) = doc.as_mapping() else {
            return Err(AmlError::MarkupShape {
                detail: "style sheet must be a mapping of style keys".into(),
            });
        };

        for (key, body) in mapping {
            let key = key.as_str().ok_or_else(|| AmlError::MarkupShape {
                detail: "style keys must be strings".into(),
            })?;
            let body = body.as_mapping().ok_or_else(|| AmlError::MarkupShape {
                detail: format!("style '{key}' must map members to literals"),
            })?;

            let mut entries = Vec::with_capacity(body.len());
            for (member, value) in body {
                let member = member.as_str().ok_or_else(|| AmlError::MarkupShape {
                    detail: format!("member names in style '{key}' must be strings"),
                })?;
                let text = match value {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    other => {
                        return Err(AmlError::MarkupShape {
                            detail: format!(
                                "style '{key}.{member}' must be scalar, found {other:?}"
                            ),
                        })
                    }
                };
                entries.push((member.to_string(), text));
            }
            self.sheets.insert(key.to_string(), Arc::new(entries));
            self.loaders.clear();
        }
        Ok(())
    }

    pub fn load_file(&self, path: &Path) -> Result<(), AmlError> {
        let text = std::fs::read_to_string(path)?;
        self.load_str(&text)
    }

    /// Load every `*.style.yaml` under a directory
    pub fn load_dir(&self, dir: &Path) -> Result<usize, AmlError> {
        let mut loaded = 0;
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".style.yaml"))
            {
                self.load_file(path)?;
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    pub fn sheet(&self, key: &str) -> Option<Arc<Vec<(String, String)>>> {
        self.sheets.get(key).map(|s| Arc::clone(&s))
    }

    /// Resolve (and cache) the defaults loader for one element.
    ///
    /// Lookup order: explicit style key, else the type name, else the
    /// base-chain type names — first match wins. Style members the
    /// type does not declare are skipped; declared members that fail
    /// conversion abort the compile.
    pub fn resolve_loader(
        &self,
        registry: &TypeRegistry,
        style_key: Option<&str>,
        ty: &Arc<TypeDescriptor>,
    ) -> Result<Arc<DefaultsLoader>, AmlError> {
        let cache_key = (
            style_key.unwrap_or_default().to_string(),
            Arc::clone(&ty.name),
        );
        if let Some(cached) = self.loaders.get(&cache_key) {
            return Ok(Arc::clone(&cached));
        }

        // declared defaults, base first so derived types override
        let mut chain = Vec::new();
        let mut current = Some(Arc::clone(ty));
        while let Some(desc) = current {
            current = desc.base.as_deref().and_then(|b| registry.get(b));
            chain.push(desc);
        }

        let mut entries: Vec<(String, Value)> = Vec::new();
        let mut upsert = |member: String, value: Value| {
            match entries.iter_mut().find(|(m, _)| *m == member) {
                Some(slot) => slot.1 = value,
                None => entries.push((member, value)),
            }
        };

        for desc in chain.iter().rev() {
            for member in desc.members.values() {
                if let Some(default) = &member.default {
                    upsert(member.name.clone(), default.clone());
                }
            }
        }

        // first matching sheet wins
        let sheet = style_key
            .and_then(|key| self.sheet(key))
            .or_else(|| chain.iter().find_map(|desc| self.sheet(&desc.name)));

        if let Some(sheet) = sheet {
            for (member, literal) in sheet.iter() {
                let Some(kind) = registry
                    .resolve_member(&ty.name, member)
                    .and_then(|m| m.value_kind())
                else {
                    debug!(
                        member = member.as_str(),
                        type_name = %ty.name,
                        "style member not on type; skipped"
                    );
                    continue;
                };
                let value = convert::convert_literal(literal, &kind, registry)?;
                upsert(member.clone(), value);
            }
        }

        let loader = Arc::new(DefaultsLoader { entries });
        self.loaders.insert(cache_key, Arc::clone(&loader));
        Ok(loader)
    }

    /// Cached loader count — tooling/tests
    pub fn loader_cache_len(&self) -> usize {
        self.loaders.len()
    }

    /// Drop cached loaders (hot reload, tests)
    pub fn reset_caches(&self) {
        self.loaders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(yaml: &str) -> StyleStore {
        let store = StyleStore::new();
        store.load_str(yaml).unwrap();
        store
    }

    #[test]
    fn declared_defaults_without_styles() {
        let registry = TypeRegistry::with_builtins();
        let store = StyleStore::new();
        let label = registry.get("Label").unwrap();
        let loader = store.resolve_loader(&registry, None, &label).unwrap();
        let font = loader
            .entries
            .iter()
            .find(|(m, _)| m == "FontSize")
            .unwrap();
        assert_eq!(font.1, json!(12));
        // inherited defaults come through too
        assert!(loader.entries.iter().any(|(m, _)| m == "Visible"));
    }

    #[test]
    fn explicit_key_beats_type_name() {
        let registry = TypeRegistry::with_builtins();
        let store = store_with("Fancy:\n  FontSize: \"20\"\nLabel:\n  FontSize: \"14\"\n");
        let label = registry.get("Label").unwrap();

        let by_key = store
            .resolve_loader(&registry, Some("Fancy"), &label)
            .unwrap();
        assert!(by_key.entries.contains(&("FontSize".into(), json!(20))));

        let by_type = store.resolve_loader(&registry, None, &label).unwrap();
        assert!(by_type.entries.contains(&("FontSize".into(), json!(14))));
    }

    #[test]
    fn base_chain_style_matches() {
        let registry = TypeRegistry::with_builtins();
        // no TextBox sheet; the Label sheet applies via the base chain
        let store = store_with("Label:\n  FontSize: \"15\"\n");
        let textbox = registry.get("TextBox").unwrap();
        let loader = store.resolve_loader(&registry, None, &textbox).unwrap();
        assert!(loader.entries.contains(&("FontSize".into(), json!(15))));
    }

    #[test]
    fn loader_cached_per_key() {
        let registry = TypeRegistry::with_builtins();
        let store = store_with("Label:\n  FontSize: \"15\"\n");
        let label = registry.get("Label").unwrap();
        let a = store.resolve_loader(&registry, None, &label).unwrap();
        let b = store.resolve_loader(&registry, None, &label).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.loader_cache_len(), 1);
    }

    #[test]
    fn unknown_style_members_skipped() {
        let registry = TypeRegistry::with_builtins();
        let store = store_with("Label:\n  NotAMember: \"1\"\n  FontSize: \"9\"\n");
        let label = registry.get("Label").unwrap();
        let loader = store.resolve_loader(&registry, None, &label).unwrap();
        assert!(!loader.entries.iter().any(|(m, _)| m == "NotAMember"));
        assert!(loader.entries.contains(&("FontSize".into(), json!(9))));
    }

    #[test]
    fn bad_style_literal_fails_compile() {
        let registry = TypeRegistry::with_builtins();
        let store = store_with("Label:\n  FontSize: \"huge\"\n");
        let label = registry.get("Label").unwrap();
        let err = store.resolve_loader(&registry, None, &label).unwrap_err();
        assert_eq!(err.code(), Some("AML-031"));
    }
}
