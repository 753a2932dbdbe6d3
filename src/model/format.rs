//! Wire and persistence formats known to the indirector.

/// A named serialization format and its mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub name: &'static str,
    pub mime: &'static str,
    /// Formats meant only for local persistence are never advertised to peers.
    wire: bool,
}

impl Format {
    pub const JSON: Format = Format::new("json", "application/json", true);
    pub const PSON: Format = Format::new("pson", "text/pson", true);
    pub const MSGPACK: Format = Format::new("msgpack", "application/x-msgpack", true);
    pub const BINARY: Format = Format::new("binary", "application/octet-stream", true);
    pub const TEXT: Format = Format::new("s", "text/plain", true);
    pub const YAML: Format = Format::new("yaml", "text/yaml", false);
    pub const B64_ZLIB_YAML: Format = Format::new("b64_zlib_yaml", "text/b64_zlib_yaml", false);
    pub const DOT: Format = Format::new("dot", "text/dot", false);

    pub const ALL: [Format; 8] = [
        Format::JSON,
        Format::PSON,
        Format::MSGPACK,
        Format::BINARY,
        Format::TEXT,
        Format::YAML,
        Format::B64_ZLIB_YAML,
        Format::DOT,
    ];

    const fn new(name: &'static str, mime: &'static str, wire: bool) -> Self {
        Self { name, mime, wire }
    }

    pub fn by_name(name: &str) -> Option<Format> {
        Self::ALL.iter().copied().find(|f| f.name == name)
    }

    /// Look a format up by mime type, ignoring parameters such as `charset`.
    pub fn by_mime(content_type: &str) -> Option<Format> {
        let mime = mime_type(content_type);
        Self::ALL.iter().copied().find(|f| f.mime.eq_ignore_ascii_case(mime))
    }

    /// Whether the format may be sent to or requested from a peer.
    pub fn is_wire_safe(&self) -> bool {
        self.wire
    }
}

/// The mime-type portion of a `Content-Type` value.
pub fn mime_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Build an `Accept` header value from a model's supported formats.
pub fn accept_header(formats: &[Format]) -> String {
    formats
        .iter()
        .filter(|f| f.is_wire_safe())
        .map(|f| f.mime)
        .collect::<Vec<_>>()
        .join(", ")
}
