//! Algorithm provider contracts and registries.
//!
//! Every pluggable algorithm family (compression, encryption, checksum,
//! KDF) is represented as a trait plus a `Registry<T>` that resolves a
//! provider by its string ID (case-insensitive) or its on-disk numeric ID.
//! Registration is idempotent: registering a second provider under an
//! already-occupied string or numeric ID is a no-op that keeps whichever
//! provider was registered first, so built-in registration at process
//! start can never be shadowed by a careless duplicate `register` call.

pub mod checksum;
pub mod compression;
pub mod encryption;
pub mod kdf;
pub mod keywrap;

use std::collections::HashMap;
use std::sync::Arc;

/// Generic first-registration-wins registry keyed by both a lowercase
/// string ID and a numeric ID.
pub struct Registry<T: ?Sized> {
    by_name: HashMap<String, Arc<T>>,
    by_numeric_id: HashMap<u8, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self { by_name: HashMap::new(), by_numeric_id: HashMap::new() }
    }

    /// Registers `provider` under `name` (case-insensitive) and
    /// `numeric_id`. Returns `true` if this registration took effect,
    /// `false` if either key was already occupied and the existing
    /// provider was kept.
    pub fn register(&mut self, name: &str, numeric_id: u8, provider: Arc<T>) -> bool {
        let key = name.to_ascii_lowercase();
        if self.by_name.contains_key(&key) || self.by_numeric_id.contains_key(&numeric_id) {
            return false;
        }
        self.by_name.insert(key, provider.clone());
        self.by_numeric_id.insert(numeric_id, provider);
        true
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<T>> {
        self.by_name.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn get_by_numeric_id(&self, numeric_id: u8) -> Option<Arc<T>> {
        self.by_numeric_id.get(&numeric_id).cloned()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Dummy {
        fn tag(&self) -> &str;
    }
    struct A;
    impl Dummy for A {
        fn tag(&self) -> &str {
            "a"
        }
    }
    struct B;
    impl Dummy for B {
        fn tag(&self) -> &str {
            "b"
        }
    }

    #[test]
    fn first_registration_wins() {
        let mut reg: Registry<dyn Dummy> = Registry::new();
        assert!(reg.register("thing", 1, Arc::new(A)));
        assert!(!reg.register("thing", 2, Arc::new(B)));
        assert_eq!(reg.get_by_name("THING").unwrap().tag(), "a");
        assert!(reg.get_by_numeric_id(2).is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut reg: Registry<dyn Dummy> = Registry::new();
        reg.register("Zstd", 1, Arc::new(A));
        assert!(reg.get_by_name("zstd").is_some());
        assert!(reg.get_by_name("ZSTD").is_some());
    }
}
