//! Resource identity.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

/// Process-wide memo of full names. Identities are bounded by manifest
/// content, so entries are never evicted.
fn full_name_cache() -> &'static DashMap<ResourceName, Arc<str>> {
    static CACHE: OnceLock<DashMap<ResourceName, Arc<str>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Immutable identity of a physical resource: `name`, optional `variant`,
/// `extension`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName {
    name: String,
    variant: Option<String>,
    extension: String,
}

impl ResourceName {
    pub fn new(
        name: impl Into<String>,
        variant: Option<impl Into<String>>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            variant: variant.map(Into::into),
            extension: extension.into(),
        }
    }

    /// Shorthand for a resource without a variant.
    pub fn plain(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: None,
            extension: extension.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `name[.variant].extension`, memoised per distinct identity.
    pub fn full_name(&self) -> Arc<str> {
        if let Some(cached) = full_name_cache().get(self) {
            return cached.clone();
        }
        let full: Arc<str> = match &self.variant {
            Some(v) => format!("{}.{}.{}", self.name, v, self.extension),
            None => format!("{}.{}", self.name, self.extension),
        }
        .into();
        full_name_cache()
            .entry(self.clone())
            .or_insert(full)
            .clone()
    }

    /// True when the resource has no variant or its variant is the active one.
    pub fn matches_variant(&self, active: Option<&str>) -> bool {
        match &self.variant {
            None => true,
            Some(v) => active == Some(v.as_str()),
        }
    }

    /// Remote file name qualified by the content hash:
    /// `name[.variant].{hash:08x}.{extension}`.
    pub fn hash_qualified_name(&self, hash: u32, extension: &str) -> String {
        let hash_hex = hex::encode(hash.to_be_bytes());
        match &self.variant {
            Some(v) => format!("{}.{}.{}.{}", self.name, v, hash_hex, extension),
            None => format!("{}.{}.{}", self.name, hash_hex, extension),
        }
    }
}

impl Ord for ResourceName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.variant.cmp(&other.variant))
            .then_with(|| self.extension.cmp(&other.extension))
    }
}

impl PartialOrd for ResourceName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_with_and_without_variant() {
        assert_eq!(&*ResourceName::plain("ui/main", "dat").full_name(), "ui/main.dat");
        assert_eq!(
            &*ResourceName::new("ui/main", Some("hd"), "dat").full_name(),
            "ui/main.hd.dat"
        );
    }

    #[test]
    fn full_name_is_memoised() {
        let a = ResourceName::plain("memo", "bin");
        let first = a.full_name();
        let second = a.clone().full_name();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn ordering_is_name_then_variant_then_extension() {
        let base = ResourceName::plain("a", "z");
        let variant = ResourceName::new("a", Some("hd"), "a");
        let later = ResourceName::plain("b", "a");
        assert!(base < variant, "absent variant sorts first");
        assert!(variant < later);
        assert!(ResourceName::plain("a", "a") < ResourceName::plain("a", "b"));
    }

    #[test]
    fn equality_is_exact_text() {
        assert_ne!(ResourceName::plain("A", "dat"), ResourceName::plain("a", "dat"));
        assert_ne!(
            ResourceName::new("a", Some("hd"), "dat"),
            ResourceName::plain("a", "dat")
        );
    }

    #[test]
    fn hash_qualified_name_uses_eight_hex_digits() {
        let r = ResourceName::new("level", Some("sd"), "ab");
        assert_eq!(r.hash_qualified_name(0x1f, "dat"), "level.sd.0000001f.dat");
        let p = ResourceName::plain("level", "ab");
        assert_eq!(p.hash_qualified_name(0xdeadbeef, "dat"), "level.deadbeef.dat");
    }
}
