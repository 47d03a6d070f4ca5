//! Opaque handles to objects resident in the compute context.
//!
//! A handle is a capability, not a value: the host holds only the identifier
//! and the compute context owns the object. Nothing is reference counted and
//! nothing is released automatically; every create must be paired with
//! exactly one release.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use dashmap::DashMap;

/// Typed handle to an engine-resident object of kind `T`.
///
/// Deliberately not `Clone`: [`crate::Bridge::release`] takes it by value, so
/// the type system rules out using a handle after releasing it.
/// [`ObjectId::id`] and [`ObjectId::from_raw`] exist for callers that need to
/// stash identifiers elsewhere and accept the risk.
pub struct ObjectId<T> {
    id: String,
    _kind: PhantomData<fn() -> T>,
}

impl<T> ObjectId<T> {
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drop the type tag (for heterogeneous release lists and the dynamic API).
    pub fn erase(self) -> AnyObjectId {
        AnyObjectId(self.id)
    }
}

impl<T> std::fmt::Debug for ObjectId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = std::any::type_name::<T>();
        let kind = kind.rsplit("::").next().unwrap_or(kind);
        write!(f, "ObjectId<{kind}>({})", self.id)
    }
}

impl<T> PartialEq for ObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ObjectId<T> {}

impl<T> Hash for ObjectId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Handle with the type tag erased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnyObjectId(String);

impl AnyObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl<T> From<ObjectId<T>> for AnyObjectId {
    fn from(id: ObjectId<T>) -> Self {
        id.erase()
    }
}

/// Type tags for [`ObjectId`]. Uninhabited; they exist only at compile time.
pub mod kinds {
    #[derive(Debug)]
    pub enum DocumentScanner {}
    #[derive(Debug)]
    pub enum BarcodeScanner {}
    #[derive(Debug)]
    pub enum PdfGenerationContext {}
    #[derive(Debug)]
    pub enum TiffGenerationContext {}
    #[derive(Debug)]
    pub enum MrzScanner {}
    #[derive(Debug)]
    pub enum OcrEngine {}
    #[derive(Debug)]
    pub enum TextPatternScanner {}
    #[derive(Debug)]
    pub enum VinScanner {}
    #[derive(Debug)]
    pub enum DocumentQualityAnalyzer {}
    #[derive(Debug)]
    pub enum DocumentDataExtractor {}
}

/// Handles minted through this bridge and not yet released.
///
/// Bookkeeping only. It feeds diagnostics and the double-release check; the
/// compute context stays the authority on which objects exist.
#[derive(Debug, Default)]
pub(crate) struct HandleLedger {
    live: DashMap<String, &'static str>,
}

impl HandleLedger {
    pub fn record(&self, id: &str, created_by: &'static str) {
        self.live.insert(id.to_string(), created_by);
    }

    /// Forget `id`. Returns false if it was not live.
    pub fn release(&self, id: &str) -> bool {
        self.live.remove(id).is_some()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Snapshot of live ids with the command that created each.
    pub fn live(&self) -> Vec<(String, &'static str)> {
        let mut live: Vec<_> = self
            .live
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        live.sort();
        live
    }
}
