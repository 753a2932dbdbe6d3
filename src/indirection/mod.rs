//! Indirection router.
//!
//! # Responsibilities
//! - Resolve the terminus (and optional cache terminus) for each call
//! - Apply validation and authorization before any work
//! - Read through and write back the cache; stamp expirations
//! - Keep per-thread overridable terminus, cache and TTL settings
//!
//! # Design Decisions
//! - Cache reads are best effort: failures are logged and treated as misses
//! - Cache writes after a successful terminus call are fatal when they fail
//! - Termini are built lazily, once per type, until memoization is cleared
//! - Terminus and cache names are checked against the registry on assignment
//!
//! # Data Flow
//! ```text
//! find(key, options)
//!     → Request::new
//!     → prepare: select terminus → validate → authorize (remote only)
//!     → cache.find (unless ignore_cache); fresh hit returns early
//!     → terminus.find (unless ignore_terminus)
//!     → stamp expiration → cache.save (unless ignore_cache_save) → filter
//! ```

mod registry;
mod thread_setting;

pub use registry::{clear_all_memoized, model, names};
pub use thread_setting::ThreadSetting;

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::config;
use crate::error::{IndirectorError, Result};
use crate::model::Model;
use crate::observability::metrics::{self, CacheOutcome};
use crate::request::{Method, Options, Request};
use crate::terminus::{self, Terminus};

/// Chooses a terminus type per request, overriding `terminus_class`.
pub type TerminusSelector<M> = Arc<dyn Fn(&Request<M>) -> Option<String> + Send + Sync>;

/// How far in the past `expire` moves a cached entry's expiration.
const EXPIRE_BACKDATE_SECS: i64 = 60;

/// Largest TTL representable as a duration.
const MAX_TTL_SECS: i64 = i64::MAX / 1000;

/// Initial settings for a new indirection.
#[derive(Debug, Clone, Default)]
pub struct IndirectionOptions {
    /// Terminus type used when no thread or global override is set.
    pub terminus_class: Option<String>,
    /// Name of a `termini` setting that supplies the terminus type.
    pub terminus_setting: Option<String>,
    /// Cache terminus type; `None` disables caching.
    pub cache_class: Option<String>,
    /// Human-readable description.
    pub doc: Option<String>,
}

impl IndirectionOptions {
    pub fn terminus_class(mut self, name: impl Into<String>) -> Self {
        self.terminus_class = Some(name.into());
        self
    }

    pub fn terminus_setting(mut self, name: impl Into<String>) -> Self {
        self.terminus_setting = Some(name.into());
        self
    }

    pub fn cache_class(mut self, name: impl Into<String>) -> Self {
        self.cache_class = Some(name.into());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// The router for one model type.
pub struct Indirection<M: Model> {
    name: String,
    doc: Option<String>,
    terminus_class: ThreadSetting<Option<String>>,
    terminus_setting: ThreadSetting<Option<String>>,
    cache_class: ThreadSetting<Option<String>>,
    ttl: ThreadSetting<Option<u64>>,
    termini: DashMap<String, Arc<dyn Terminus<M>>>,
    selector: RwLock<Option<TerminusSelector<M>>>,
}

impl<M: Model> registry::Registered for Indirection<M> {
    fn model_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn clear_cache(&self) {
        Indirection::clear_cache(self);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<M: Model> Indirection<M> {
    /// Create and register an indirection. Names are unique process-wide.
    ///
    /// Initial terminus and cache names are checked when first used, since
    /// termini can only register once the indirection exists.
    pub fn register(name: &str, options: IndirectionOptions) -> Result<Arc<Self>> {
        if name.is_empty() {
            return Err(IndirectorError::Argument(
                "Indirection requires a name".to_string(),
            ));
        }

        let indirection = Arc::new(Self {
            name: name.to_string(),
            doc: options.doc,
            terminus_class: ThreadSetting::new(options.terminus_class),
            terminus_setting: ThreadSetting::new(options.terminus_setting),
            cache_class: ThreadSetting::new(options.cache_class),
            ttl: ThreadSetting::new(None),
            termini: DashMap::new(),
            selector: RwLock::new(None),
        });

        registry::insert(name, Arc::clone(&indirection) as Arc<dyn registry::Registered>)?;
        tracing::debug!(indirection = %name, model = std::any::type_name::<M>(), "Indirection registered");
        Ok(indirection)
    }

    /// Look up a registered indirection for this model type.
    pub fn instance(name: &str) -> Option<Arc<Self>> {
        registry::get(name)?.into_any().downcast::<Self>().ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Remove the indirection and its termini from the registries.
    pub fn delete(&self) {
        registry::remove(&self.name);
        terminus::registry::unregister_all(&self.name);
        self.clear_cache();
    }

    /// Drop memoized terminus and cache instances.
    pub fn clear_cache(&self) {
        self.termini.clear();
    }

    /// Install a per-request terminus chooser.
    pub fn select_terminus<F>(&self, selector: F)
    where
        F: Fn(&Request<M>) -> Option<String> + Send + Sync + 'static,
    {
        *self.selector.write() = Some(Arc::new(selector));
    }

    // --- settings ---

    /// The terminus type for the calling thread.
    ///
    /// Falls back to the `termini` setting named by `terminus_setting`.
    pub fn terminus_class(&self) -> Result<String> {
        if let Some(name) = self.terminus_class.get() {
            return Ok(name);
        }

        match self.terminus_setting.get() {
            Some(setting) => config::current().termini.get(&setting).cloned().ok_or_else(|| {
                IndirectorError::Configuration(format!(
                    "Setting {} names no terminus for indirection {}",
                    setting, self.name
                ))
            }),
            None => Err(IndirectorError::Configuration(format!(
                "No terminus class nor terminus setting was provided for indirection {}",
                self.name
            ))),
        }
    }

    /// Set the terminus type on the calling thread.
    pub fn set_terminus_class(&self, name: &str) -> Result<()> {
        self.validate_terminus_class(name)?;
        self.terminus_class.set(Some(name.to_string()));
        Ok(())
    }

    /// Set the terminus type for every thread.
    pub fn set_terminus_class_globally(&self, name: &str) -> Result<()> {
        self.validate_terminus_class(name)?;
        self.terminus_class.set_global(Some(name.to_string()));
        Ok(())
    }

    pub fn terminus_setting(&self) -> Option<String> {
        self.terminus_setting.get()
    }

    pub fn set_terminus_setting(&self, setting: Option<&str>) {
        self.terminus_setting.set(setting.map(str::to_string));
    }

    pub fn set_terminus_setting_globally(&self, setting: Option<&str>) {
        self.terminus_setting.set_global(setting.map(str::to_string));
    }

    /// The cache terminus type for the calling thread, if caching is enabled.
    pub fn cache_class(&self) -> Option<String> {
        self.cache_class.get()
    }

    /// Set (or with `None`, disable) the cache on the calling thread.
    pub fn set_cache_class(&self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            self.validate_terminus_class(name)?;
        }
        self.cache_class.set(name.map(str::to_string));
        Ok(())
    }

    /// Set (or with `None`, disable) the cache for every thread.
    pub fn set_cache_class_globally(&self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            self.validate_terminus_class(name)?;
        }
        self.cache_class.set_global(name.map(str::to_string));
        Ok(())
    }

    /// Seconds an instance stays fresh; defaults to `runinterval`.
    pub fn ttl(&self) -> u64 {
        self.ttl.get().unwrap_or_else(|| config::current().runinterval)
    }

    pub fn set_ttl(&self, ttl: u64) {
        self.ttl.set(Some(ttl));
    }

    pub fn set_ttl_globally(&self, ttl: u64) {
        self.ttl.set_global(Some(ttl));
    }

    /// Expiration stamped on instances that carry none.
    pub fn expiration(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl()).unwrap_or(i64::MAX).min(MAX_TTL_SECS);
        Utc::now()
            .checked_add_signed(Duration::seconds(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn validate_terminus_class(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(IndirectorError::Argument(format!(
                "Invalid terminus name {:?}",
                name
            )));
        }
        if !terminus::registered(&self.name, name) {
            return Err(IndirectorError::Argument(format!(
                "Could not find terminus {} for indirection {}",
                name, self.name
            )));
        }
        Ok(())
    }

    // --- termini ---

    /// The memoized terminus of the given type.
    pub fn terminus(&self, terminus_type: &str) -> Result<Arc<dyn Terminus<M>>> {
        if let Some(existing) = self.termini.get(terminus_type) {
            return Ok(Arc::clone(existing.value()));
        }

        let built = terminus::registry::make::<M>(&self.name, terminus_type)?;
        tracing::debug!(indirection = %self.name, terminus = %terminus_type, "Terminus created");
        let entry = self
            .termini
            .entry(terminus_type.to_string())
            .or_insert(built);
        Ok(Arc::clone(entry.value()))
    }

    /// Whether a cache is configured on the calling thread.
    pub fn has_cache(&self) -> bool {
        self.cache_class().is_some()
    }

    /// The cache terminus, if caching is enabled.
    pub fn cache(&self) -> Result<Option<Arc<dyn Terminus<M>>>> {
        match self.cache_class() {
            Some(name) => self.terminus(&name).map(Some),
            None => Ok(None),
        }
    }

    /// Build a request against this indirection.
    pub fn request(
        &self,
        method: Method,
        key: Option<&str>,
        instance: Option<M>,
        options: Options,
    ) -> Result<Request<M>> {
        Request::new(self.name.clone(), method, key, instance, options)
    }

    // --- operations ---

    /// Find one instance, consulting the cache first.
    pub fn find(&self, key: &str, options: Options) -> Result<Option<M>> {
        let request = self.request(Method::Find, Some(key), None, options)?;
        metrics::record_request(&self.name, Method::Find);
        let terminus = self.prepare(&request)?;

        if let Some(cached) = self.find_in_cache(&request) {
            return Ok(Some(cached));
        }
        if request.ignore_terminus() {
            return Ok(None);
        }

        let Some(mut result) = terminus.find(&request)? else {
            return Ok(None);
        };
        if result.expiration().is_none() {
            result.set_expiration(Some(self.expiration()));
        }

        if !request.ignore_cache_save() {
            if let Some(cache) = self.cache()? {
                tracing::info!(indirection = %self.name, key = %request.key(), "Caching instance");
                let save = request.derive(Method::Save, Some(result.clone()));
                if let Err(e) = cache.save(&save) {
                    tracing::error!(
                        indirection = %self.name,
                        key = %request.key(),
                        error = %e,
                        "Failed to cache instance"
                    );
                    return Err(e);
                }
            }
        }

        match terminus.filter() {
            Some(filter) => filter.filter(result).map(Some),
            None => Ok(Some(result)),
        }
    }

    /// Whether an instance exists. Never writes to the cache.
    pub fn head(&self, key: &str, options: Options) -> Result<bool> {
        let request = self.request(Method::Head, Some(key), None, options)?;
        metrics::record_request(&self.name, Method::Head);
        let terminus = self.prepare(&request)?;

        if self.find_in_cache(&request).is_some() {
            return Ok(true);
        }
        if request.ignore_terminus() {
            return Ok(false);
        }
        terminus.head(&request)
    }

    /// Search the terminus; results are never cached.
    pub fn search(&self, key: &str, options: Options) -> Result<Vec<M>> {
        let request = self.request(Method::Search, Some(key), None, options)?;
        metrics::record_request(&self.name, Method::Search);
        let terminus = self.prepare(&request)?;

        let results = terminus.search(&request)?;
        let filter = terminus.filter();
        results
            .into_iter()
            .map(|mut instance| {
                if instance.expiration().is_none() {
                    instance.set_expiration(Some(self.expiration()));
                }
                match filter {
                    Some(filter) => filter.filter(instance),
                    None => Ok(instance),
                }
            })
            .collect()
    }

    /// Save an instance, under its own name unless a key is given.
    ///
    /// The cache is written only after the terminus save succeeds, or instead
    /// of it when the request ignores the terminus.
    pub fn save(&self, instance: M, key: Option<&str>, options: Options) -> Result<Option<M>> {
        let request = self.request(Method::Save, key, Some(instance), options)?;
        metrics::record_request(&self.name, Method::Save);
        let terminus = self.prepare(&request)?;

        let result = if request.ignore_terminus() {
            None
        } else {
            terminus.save(&request)?
        };

        if !request.ignore_cache_save() {
            if let Some(cache) = self.cache()? {
                if let Err(e) = cache.save(&request) {
                    tracing::error!(
                        indirection = %self.name,
                        key = %request.key(),
                        error = %e,
                        "Failed to save instance to cache"
                    );
                    return Err(e);
                }
            }
        }

        Ok(result)
    }

    /// Destroy an instance in the terminus and, if cached, in the cache.
    pub fn destroy(&self, key: &str, options: Options) -> Result<Option<M>> {
        let request = self.request(Method::Destroy, Some(key), None, options)?;
        metrics::record_request(&self.name, Method::Destroy);
        let terminus = self.prepare(&request)?;

        let result = terminus.destroy(&request)?;

        if let Some(cache) = self.cache()? {
            if cache.find(&request.derive(Method::Find, None))?.is_some() {
                cache.destroy(&request)?;
            }
        }

        Ok(result)
    }

    /// Mark a cached instance as expired. A no-op without a cache.
    pub fn expire(&self, key: &str, options: Options) -> Result<Option<M>> {
        let request = self.request(Method::Find, Some(key), None, options)?;
        if request.ignore_cache_save() {
            return Ok(None);
        }
        let Some(cache) = self.cache()? else {
            return Ok(None);
        };
        let Some(mut instance) = cache.find(&request)? else {
            return Ok(None);
        };

        tracing::info!(indirection = %self.name, key = %request.key(), "Expiring cached instance");
        instance.set_expiration(Some(Utc::now() - Duration::seconds(EXPIRE_BACKDATE_SECS)));
        cache.save(&request.derive(Method::Save, Some(instance.clone())))?;
        Ok(Some(instance))
    }

    // --- internals ---

    /// Resolve the terminus, then validate and authorize the request.
    fn prepare(&self, request: &Request<M>) -> Result<Arc<dyn Terminus<M>>> {
        let selector = self.selector.read().clone();
        let terminus_name = match selector {
            Some(selector) => selector(request).ok_or_else(|| {
                IndirectorError::Configuration(format!(
                    "Could not determine the terminus for {} on {}",
                    request.method(),
                    request.description()
                ))
            })?,
            None => self.terminus_class()?,
        };
        let terminus = self.terminus(&terminus_name)?;

        if let Some(validator) = terminus.validator() {
            validator.validate(request)?;
        }
        if let Some(cache) = self.cache()? {
            if let Some(validator) = cache.validator() {
                validator.validate(request)?;
            }
        }

        if request.is_remote() {
            if let Some(authorizer) = terminus.authorizer() {
                if !authorizer.is_authorized(request) {
                    tracing::warn!(
                        indirection = %self.name,
                        method = %request.method(),
                        key = %request.key(),
                        node = request.node().unwrap_or(""),
                        "Request not authorized"
                    );
                    return Err(IndirectorError::Authorization {
                        method: request.method(),
                        key: request.key().to_string(),
                    });
                }
            }
        }

        Ok(terminus)
    }

    /// A fresh cached instance, or `None` on miss, expiry or cache failure.
    fn find_in_cache(&self, request: &Request<M>) -> Option<M> {
        if request.ignore_cache() {
            return None;
        }

        let lookup = self.cache().and_then(|cache| match cache {
            Some(cache) => cache.find(request),
            None => Ok(None),
        });

        let outcome = match lookup {
            Err(e) => {
                tracing::warn!(
                    indirection = %self.name,
                    key = %request.key(),
                    error = %e,
                    "Cache lookup failed; falling back to the terminus"
                );
                (CacheOutcome::Error, None)
            }
            Ok(None) => (CacheOutcome::Miss, None),
            Ok(Some(cached)) if cached.is_expired() => {
                tracing::info!(
                    indirection = %self.name,
                    key = %request.key(),
                    expired_at = ?cached.expiration(),
                    "Not using expired cached instance"
                );
                (CacheOutcome::Expired, None)
            }
            Ok(Some(cached)) => {
                tracing::debug!(indirection = %self.name, key = %request.key(), "Using cached instance");
                (CacheOutcome::Hit, Some(cached))
            }
        };

        if self.has_cache() {
            metrics::record_cache_lookup(&self.name, outcome.0);
        }
        outcome.1
    }
}
