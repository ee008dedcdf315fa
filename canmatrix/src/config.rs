//! Load and dump configuration
//!
//! One options struct per operation. Both are plain data with `serde` support,
//! so a caller can keep them in its own configuration file.

use crate::types::{CanMatrixError, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Options for reading a matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Codec for identifiers and structural tokens
    #[serde(default = "default_encoding")]
    pub import_encoding: String,

    /// Codec for free-text comments (defaults to `import_encoding`)
    #[serde(default)]
    pub import_comment_encoding: Option<String>,
}

/// Options for writing a matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpOptions {
    /// Codec for identifiers and structural tokens
    #[serde(default = "default_encoding")]
    pub export_encoding: String,

    /// Codec for free-text comments (defaults to `export_encoding`)
    #[serde(default)]
    pub export_comment_encoding: Option<String>,

    /// Substitute for whitespace inside identifiers
    #[serde(default = "default_whitespace_replacement")]
    pub whitespace_replacement: String,
}

fn default_encoding() -> String {
    "iso-8859-1".to_string()
}

fn default_whitespace_replacement() -> String {
    "_".to_string()
}

/// Resolve a WHATWG encoding label
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| CanMatrixError::UnknownEncoding(label.to_string()))
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            import_encoding: default_encoding(),
            import_comment_encoding: None,
        }
    }
}

impl LoadOptions {
    /// Create load options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the identifier encoding
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.import_encoding = label.into();
        self
    }

    /// Builder method: set the comment encoding
    pub fn with_comment_encoding(mut self, label: impl Into<String>) -> Self {
        self.import_comment_encoding = Some(label.into());
        self
    }

    /// Resolve (identifier, comment) codecs
    pub fn encodings(&self) -> Result<(&'static Encoding, &'static Encoding)> {
        let ident = resolve_encoding(&self.import_encoding)?;
        let comment = match &self.import_comment_encoding {
            Some(label) => resolve_encoding(label)?,
            None => ident,
        };
        Ok((ident, comment))
    }
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            export_encoding: default_encoding(),
            export_comment_encoding: None,
            whitespace_replacement: default_whitespace_replacement(),
        }
    }
}

impl DumpOptions {
    /// Create dump options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the identifier encoding
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.export_encoding = label.into();
        self
    }

    /// Builder method: set the comment encoding
    pub fn with_comment_encoding(mut self, label: impl Into<String>) -> Self {
        self.export_comment_encoding = Some(label.into());
        self
    }

    /// Builder method: set the whitespace replacement
    pub fn with_whitespace_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.whitespace_replacement = replacement.into();
        self
    }

    /// Resolve (identifier, comment) codecs
    pub fn encodings(&self) -> Result<(&'static Encoding, &'static Encoding)> {
        let ident = resolve_encoding(&self.export_encoding)?;
        let comment = match &self.export_comment_encoding {
            Some(label) => resolve_encoding(label)?,
            None => ident,
        };
        Ok((ident, comment))
    }

    /// Replace whitespace in an identifier
    ///
    /// Logs a warning when the configured replacement would still leave
    /// whitespace in the identifier.
    pub fn sanitize_identifier(&self, name: &str) -> String {
        if !name.chars().any(char::is_whitespace) {
            return name.to_string();
        }
        if self.whitespace_replacement.chars().any(char::is_whitespace) {
            log::warn!(
                "Whitespace replacement {:?} still contains whitespace (identifier {:?})",
                self.whitespace_replacement,
                name
            );
        }
        name.split(char::is_whitespace)
            .collect::<Vec<_>>()
            .join(&self.whitespace_replacement)
    }
}
