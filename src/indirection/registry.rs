//! Process-wide indirection registry.
//!
//! Indirections for different model types live side by side; each entry is
//! stored type-erased and recovered by downcasting to the caller's model.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{IndirectorError, Result};

/// Model-independent view of a registered indirection.
pub(crate) trait Registered: Send + Sync {
    fn model_name(&self) -> &'static str;

    /// Drop memoized terminus instances.
    fn clear_cache(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

fn indirections() -> &'static DashMap<String, Arc<dyn Registered>> {
    static INDIRECTIONS: OnceLock<DashMap<String, Arc<dyn Registered>>> = OnceLock::new();
    INDIRECTIONS.get_or_init(DashMap::new)
}

pub(crate) fn insert(name: &str, indirection: Arc<dyn Registered>) -> Result<()> {
    match indirections().entry(name.to_string()) {
        Entry::Occupied(_) => Err(IndirectorError::Argument(format!(
            "Indirection {} is already defined",
            name
        ))),
        Entry::Vacant(slot) => {
            slot.insert(indirection);
            Ok(())
        }
    }
}

pub(crate) fn get(name: &str) -> Option<Arc<dyn Registered>> {
    indirections().get(name).map(|entry| Arc::clone(entry.value()))
}

pub(crate) fn remove(name: &str) -> bool {
    indirections().remove(name).is_some()
}

/// Names of every registered indirection, sorted.
pub fn names() -> Vec<String> {
    let mut names: Vec<String> = indirections().iter().map(|e| e.key().clone()).collect();
    names.sort();
    names
}

/// Type name of the model served by the named indirection.
pub fn model(name: &str) -> Option<&'static str> {
    get(name).map(|indirection| indirection.model_name())
}

/// Drop memoized termini of every indirection. Returns how many were cleared.
pub fn clear_all_memoized() -> usize {
    let all: Vec<Arc<dyn Registered>> = indirections().iter().map(|e| Arc::clone(e.value())).collect();
    for indirection in &all {
        indirection.clear_cache();
    }
    all.len()
}
