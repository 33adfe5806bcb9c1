//! String interning for recurring type names
//!
//! Node addresses repeat the same type names thousands of times across
//! compiled units. Interning keeps one allocation per unique name and
//! makes Node equality a pointer-adjacent comparison.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Global type-name interner (thread-safe, lock-free)
static INTERNER: Lazy<Interner> = Lazy::new(Interner::new);

/// Thread-safe string interner using DashMap
pub struct Interner {
    strings: DashMap<Arc<str>, ()>,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            strings: DashMap::new(),
        }
    }

    /// Intern a string, returning a shared `Arc<str>`
    ///
    /// Concurrent misses on the same string may race; both fills insert
    /// an equal key, so the race is harmless and one Arc wins.
    pub fn intern(&self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing.key());
        }
        let key: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&key), ());
        key
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

/// Intern a type name using the global interner
#[inline]
pub fn intern(s: &str) -> Arc<str> {
    INTERNER.intern(s)
}
