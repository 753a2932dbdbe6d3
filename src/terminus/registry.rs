//! Process-wide terminus registry.
//!
//! Maps `(indirection, terminus_type)` to a factory. Registration happens at
//! start-up (and in test setup); lookups happen whenever an indirection
//! builds a terminus it has not memoized yet.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::error::{IndirectorError, Result};
use crate::indirection::Indirection;
use crate::model::Model;
use crate::terminus::{Terminus, TerminusDescriptor};

/// Builds a terminus from its declared identity.
pub type TerminusFactory<M> =
    Arc<dyn Fn(TerminusDescriptor) -> Result<Arc<dyn Terminus<M>>> + Send + Sync>;

type Key = (String, String);

fn factories() -> &'static DashMap<Key, Arc<dyn Any + Send + Sync>> {
    static FACTORIES: OnceLock<DashMap<Key, Arc<dyn Any + Send + Sync>>> = OnceLock::new();
    FACTORIES.get_or_init(DashMap::new)
}

/// Register a terminus type for an indirection.
///
/// The indirection must already be registered for the same model type.
/// Registering the same pair twice replaces the earlier factory.
pub fn register<M, F>(indirection: &str, terminus_type: &str, factory: F) -> Result<()>
where
    M: Model,
    F: Fn(TerminusDescriptor) -> Result<Arc<dyn Terminus<M>>> + Send + Sync + 'static,
{
    if terminus_type.is_empty() {
        return Err(IndirectorError::Configuration(format!(
            "Terminus for {} needs a type name",
            indirection
        )));
    }
    if Indirection::<M>::instance(indirection).is_none() {
        return Err(IndirectorError::Configuration(format!(
            "Could not find indirection '{}' for {} terminus",
            indirection, terminus_type
        )));
    }

    let factory: TerminusFactory<M> = Arc::new(factory);
    let key = (indirection.to_string(), terminus_type.to_string());
    if factories().insert(key, Arc::new(factory)).is_some() {
        tracing::warn!(
            indirection = %indirection,
            terminus = %terminus_type,
            "Terminus registered twice; keeping the latest"
        );
    }
    tracing::debug!(indirection = %indirection, terminus = %terminus_type, "Terminus registered");
    Ok(())
}

/// Whether a terminus type is registered for the indirection.
pub fn registered(indirection: &str, terminus_type: &str) -> bool {
    factories().contains_key(&(indirection.to_string(), terminus_type.to_string()))
}

/// Terminus types registered for the indirection, sorted.
pub fn terminus_types(indirection: &str) -> Vec<String> {
    let mut types: Vec<String> = factories()
        .iter()
        .filter(|entry| entry.key().0 == indirection)
        .map(|entry| entry.key().1.clone())
        .collect();
    types.sort();
    types
}

/// Build a new terminus instance.
pub fn make<M: Model>(indirection: &str, terminus_type: &str) -> Result<Arc<dyn Terminus<M>>> {
    let key = (indirection.to_string(), terminus_type.to_string());
    let entry = factories()
        .get(&key)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| {
            IndirectorError::Configuration(format!(
                "Could not find terminus {} for indirection {}",
                terminus_type, indirection
            ))
        })?;

    let factory = entry.downcast_ref::<TerminusFactory<M>>().ok_or_else(|| {
        IndirectorError::Configuration(format!(
            "Terminus {} for indirection {} serves a different model",
            terminus_type, indirection
        ))
    })?;

    factory(TerminusDescriptor::new(indirection, terminus_type))
}

/// Drop every terminus registered for the indirection.
pub fn unregister_all(indirection: &str) {
    factories().retain(|key, _| key.0 != indirection);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indirection::IndirectionOptions;
    use crate::model::Document;
    use crate::terminus::memory::Memory;

    #[test]
    fn test_requires_registered_indirection() {
        let err = register::<Document, _>("registry-missing", "memory", |d| {
            Ok(Arc::new(Memory::new(d)) as Arc<dyn Terminus<Document>>)
        })
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_register_and_make() {
        let indirection =
            Indirection::<Document>::register("registry-make", IndirectionOptions::default())
                .unwrap();
        register::<Document, _>("registry-make", "memory", |d| {
            Ok(Arc::new(Memory::new(d)) as Arc<dyn Terminus<Document>>)
        })
        .unwrap();

        assert!(registered("registry-make", "memory"));
        assert_eq!(terminus_types("registry-make"), vec!["memory".to_string()]);

        let terminus = make::<Document>("registry-make", "memory").unwrap();
        assert_eq!(terminus.descriptor().indirection, "registry-make");
        assert_eq!(terminus.descriptor().terminus_type, "memory");

        let err = make::<Document>("registry-make", "nope").err().unwrap();
        assert!(err.is_configuration());

        indirection.delete();
        assert!(!registered("registry-make", "memory"));
    }
}
