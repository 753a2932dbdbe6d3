//! In-memory terminus.
//!
//! Instances live in a concurrent map keyed by request key. Mostly used as a
//! cache terminus in front of slower backends.

use std::marker::PhantomData;

use dashmap::DashMap;

use crate::error::{IndirectorError, Result};
use crate::model::Model;
use crate::request::Request;
use crate::terminus::{Terminus, TerminusDescriptor};

/// Type name `memory` termini register under.
pub const TERMINUS_TYPE: &str = "memory";

/// A thread-safe in-memory store.
pub struct Memory<M> {
    descriptor: TerminusDescriptor,
    instances: DashMap<String, M>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Memory<M> {
    pub fn new(descriptor: TerminusDescriptor) -> Self {
        Self {
            descriptor,
            instances: DashMap::new(),
            _model: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drop every stored instance.
    pub fn clear(&self) {
        self.instances.clear();
    }
}

impl<M: Model> Terminus<M> for Memory<M> {
    fn descriptor(&self) -> &TerminusDescriptor {
        &self.descriptor
    }

    fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        Ok(self.instances.get(request.key()).map(|r| r.value().clone()))
    }

    fn head(&self, request: &Request<M>) -> Result<bool> {
        Ok(self.instances.contains_key(request.key()))
    }

    /// Every stored instance, ordered by key.
    fn search(&self, _request: &Request<M>) -> Result<Vec<M>> {
        let mut entries: Vec<(String, M)> = self
            .instances
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries.into_iter().map(|(_, instance)| instance).collect())
    }

    fn save(&self, request: &Request<M>) -> Result<Option<M>> {
        let instance = request.instance().cloned().ok_or_else(|| {
            IndirectorError::Argument(format!("Nothing to save for {}", request.key()))
        })?;
        self.instances
            .insert(request.key().to_string(), instance.clone());
        tracing::debug!(
            indirection = %self.descriptor.indirection,
            key = %request.key(),
            size = self.instances.len(),
            "Stored instance in memory"
        );
        Ok(Some(instance))
    }

    fn destroy(&self, request: &Request<M>) -> Result<Option<M>> {
        match self.instances.remove(request.key()) {
            Some((_, instance)) => Ok(Some(instance)),
            None => Err(IndirectorError::Argument(format!(
                "Could not find {} to destroy",
                request.key()
            ))),
        }
    }
}
