//! JSON file terminus.
//!
//! # Responsibilities
//! - Persist one JSON document per key under `<dir>/<indirection>/`
//! - Load documents back on demand; a missing file is "not found"
//!
//! # Design Decisions
//! - Keys are file names: separators and parent references are rejected
//! - Writes go to a temporary file first and are renamed into place
//! - Search keys may use `*` wildcards

use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{IndirectorError, Result};
use crate::model::{Format, Model};
use crate::request::Request;
use crate::terminus::{Terminus, TerminusDescriptor};

/// Type name `json` termini register under.
pub const TERMINUS_TYPE: &str = "json";

const EXTENSION: &str = "json";

/// Stores each instance as a JSON file.
pub struct JsonFile<M> {
    descriptor: TerminusDescriptor,
    dir: PathBuf,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> JsonFile<M> {
    /// Store files under `<root>/<indirection>/`.
    pub fn new(descriptor: TerminusDescriptor, root: impl AsRef<Path>) -> Self {
        let dir = root.as_ref().join(&descriptor.indirection);
        Self {
            descriptor,
            dir,
            _model: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the key.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        let invalid = key.is_empty()
            || key == "."
            || key == ".."
            || key.contains('/')
            || key.contains('\\')
            || key.contains('\0');
        if invalid {
            return Err(IndirectorError::Argument(format!("Invalid key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.{}", key, EXTENSION)))
    }

    fn load(&self, path: &Path, key: &str) -> Result<Option<M>> {
        let body = match fs::read(path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        M::convert_from(Format::JSON.mime, &body).map(Some).map_err(|e| {
            IndirectorError::Deserialization(format!(
                "Could not parse JSON data for {} {}: {}",
                self.descriptor.indirection, key, e
            ))
        })
    }
}

impl<M: Model> Terminus<M> for JsonFile<M> {
    fn descriptor(&self) -> &TerminusDescriptor {
        &self.descriptor
    }

    fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        let path = self.path(request.key())?;
        self.load(&path, request.key())
    }

    fn head(&self, request: &Request<M>) -> Result<bool> {
        Ok(self.path(request.key())?.is_file())
    }

    /// Documents whose key matches the request key, `*` matching any run of characters.
    fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys: Vec<String> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                if wildcard_match(request.key(), key) {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(instance) = self.load(&self.path(&key)?, &key)? {
                results.push(instance);
            }
        }
        Ok(results)
    }

    fn save(&self, request: &Request<M>) -> Result<Option<M>> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::Argument(format!("Nothing to save for {}", request.key()))
        })?;
        let path = self.path(request.key())?;
        let body = instance.render(Format::JSON)?;

        fs::create_dir_all(&self.dir)?;
        // Unique per writer; concurrent saves of one key race only on the rename.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::debug!(
            indirection = %self.descriptor.indirection,
            key = %request.key(),
            path = %path.display(),
            "Saved instance to disk"
        );
        Ok(Some(instance.clone()))
    }

    fn destroy(&self, request: &Request<M>) -> Result<Option<M>> {
        let path = self.path(request.key())?;
        let existing = self.load(&path, request.key())?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(existing),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Glob-style match where `*` matches any (possibly empty) run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use crate::request::{Method, Options};
    use serde_json::json;

    fn request(method: Method, key: &str, instance: Option<Document>) -> Request<Document> {
        Request::new("json-test", method, Some(key), instance, Options::new()).unwrap()
    }

    fn terminus(root: &Path) -> JsonFile<Document> {
        JsonFile::new(TerminusDescriptor::new("json-test", TERMINUS_TYPE), root)
    }

    #[test]
    fn test_save_find_destroy() {
        let tmp = tempfile::tempdir().unwrap();
        let store = terminus(tmp.path());
        let doc = Document::new("web01", json!({"role": "web"}));

        assert!(store.find(&request(Method::Find, "web01", None)).unwrap().is_none());
        store
            .save(&request(Method::Save, "web01", Some(doc.clone())))
            .unwrap();
        assert!(tmp.path().join("json-test").join("web01.json").is_file());

        assert_eq!(
            store.find(&request(Method::Find, "web01", None)).unwrap(),
            Some(doc.clone())
        );
        assert!(store.head(&request(Method::Head, "web01", None)).unwrap());

        assert_eq!(
            store.destroy(&request(Method::Destroy, "web01", None)).unwrap(),
            Some(doc)
        );
        assert!(!store.head(&request(Method::Head, "web01", None)).unwrap());
        assert!(store
            .destroy(&request(Method::Destroy, "web01", None))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_concurrent_saves_of_one_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(terminus(tmp.path()));

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let doc = Document::new("shared", json!({ "writer": n }));
                        store
                            .save(&request(Method::Save, "shared", Some(doc)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let found = store
            .find(&request(Method::Find, "shared", None))
            .unwrap()
            .unwrap();
        assert!(found.data["writer"].is_u64());

        // Nothing but the document itself is left behind.
        let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_search_with_wildcards() {
        let tmp = tempfile::tempdir().unwrap();
        let store = terminus(tmp.path());
        assert!(store.search(&request(Method::Search, "*", None)).unwrap().is_empty());

        for name in ["web01", "web02", "db01"] {
            store
                .save(&request(Method::Save, name, Some(Document::new(name, json!({})))))
                .unwrap();
        }

        let names = |key: &str| -> Vec<String> {
            store
                .search(&request(Method::Search, key, None))
                .unwrap()
                .into_iter()
                .map(|d| d.name)
                .collect()
        };
        assert_eq!(names("*"), vec!["db01", "web01", "web02"]);
        assert_eq!(names("web*"), vec!["web01", "web02"]);
        assert_eq!(names("db01"), vec!["db01"]);
    }

    #[test]
    fn test_rejects_path_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = terminus(tmp.path());
        assert!(store.path("../escape").unwrap_err().is_argument());
        assert!(store.path("..").unwrap_err().is_argument());
        assert!(store.path("").unwrap_err().is_argument());
    }

    #[test]
    fn test_corrupt_file_is_deserialization_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = terminus(tmp.path());
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.path("bad").unwrap(), b"{not json").unwrap();

        let err = store.find(&request(Method::Find, "bad", None)).unwrap_err();
        assert!(matches!(err, IndirectorError::Deserialization(_)));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*c", "abc"));
        assert!(wildcard_match("a*b*c", "aXbYc"));
        assert!(!wildcard_match("a*c", "ab"));
        assert!(!wildcard_match("ab", "abc"));
    }
}
