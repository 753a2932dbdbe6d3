//! Terminus contract.
//!
//! # Responsibilities
//! - Define the capability set every backend adapter can offer
//! - Carry the adapter's declared identity (indirection, terminus type)
//! - Expose optional hooks (validation, authorization, filtering)
//!
//! # Design Decisions
//! - Identity is declared explicitly at registration, never inferred
//! - Capabilities default to `Unsupported`; adapters override what they offer
//! - Optional hooks are separate traits returned by accessor, not probed
//!
//! # Data Flow
//! ```text
//! registry.rs (indirection, type) → factory
//!     → Indirection memoizes one instance per type
//!     → find/head/search/save/destroy
//! ```

pub mod json;
pub mod memory;
pub mod registry;
pub mod rest;

pub use registry::{register, registered, TerminusFactory};

use crate::error::{IndirectorError, Result};
use crate::model::Model;
use crate::request::{Method, Request};

/// Declared identity of a terminus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminusDescriptor {
    /// Indirection the terminus serves.
    pub indirection: String,
    /// Type name the terminus is registered under (e.g. `rest`, `memory`).
    pub terminus_type: String,
}

impl TerminusDescriptor {
    pub fn new(indirection: impl Into<String>, terminus_type: impl Into<String>) -> Self {
        Self {
            indirection: indirection.into(),
            terminus_type: terminus_type.into(),
        }
    }

    /// The error for a capability this terminus lacks.
    pub fn unsupported(&self, method: Method) -> IndirectorError {
        IndirectorError::Unsupported {
            indirection: self.indirection.clone(),
            terminus: self.terminus_type.clone(),
            method,
        }
    }
}

/// Rejects requests before any work is attempted.
pub trait Validate<M>: Send + Sync {
    fn validate(&self, request: &Request<M>) -> Result<()>;
}

/// Decides whether a remote request may proceed.
pub trait Authorize<M>: Send + Sync {
    fn is_authorized(&self, request: &Request<M>) -> bool;
}

/// Post-processes instances returned by `find` and `search`.
pub trait Filter<M>: Send + Sync {
    fn filter(&self, instance: M) -> Result<M>;
}

/// A backend adapter for one indirection.
pub trait Terminus<M: Model>: Send + Sync {
    fn descriptor(&self) -> &TerminusDescriptor;

    fn find(&self, _request: &Request<M>) -> Result<Option<M>> {
        Err(self.descriptor().unsupported(Method::Find))
    }

    fn head(&self, _request: &Request<M>) -> Result<bool> {
        Err(self.descriptor().unsupported(Method::Head))
    }

    fn search(&self, _request: &Request<M>) -> Result<Vec<M>> {
        Err(self.descriptor().unsupported(Method::Search))
    }

    fn save(&self, _request: &Request<M>) -> Result<Option<M>> {
        Err(self.descriptor().unsupported(Method::Save))
    }

    /// Returns whatever the backend reports for the removed entry.
    fn destroy(&self, _request: &Request<M>) -> Result<Option<M>> {
        Err(self.descriptor().unsupported(Method::Destroy))
    }

    fn validator(&self) -> Option<&dyn Validate<M>> {
        None
    }

    fn authorizer(&self) -> Option<&dyn Authorize<M>> {
        None
    }

    fn filter(&self) -> Option<&dyn Filter<M>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use crate::request::Options;

    struct Bare {
        descriptor: TerminusDescriptor,
    }

    impl Terminus<Document> for Bare {
        fn descriptor(&self) -> &TerminusDescriptor {
            &self.descriptor
        }
    }

    #[test]
    fn test_capabilities_default_to_unsupported() {
        let bare = Bare {
            descriptor: TerminusDescriptor::new("doc", "bare"),
        };
        let request =
            Request::<Document>::new("doc", Method::Find, Some("k"), None, Options::new()).unwrap();

        let err = bare.find(&request).unwrap_err();
        assert_eq!(err.to_string(), "Terminus bare for doc does not support find");
        assert!(bare.head(&request).is_err());
        assert!(bare.search(&request).is_err());
        assert!(bare.destroy(&request).is_err());
        assert!(bare.validator().is_none());
        assert!(bare.authorizer().is_none());
        assert!(bare.filter().is_none());
    }
}
