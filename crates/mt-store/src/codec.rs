//! Component C: the key codec.
//!
//! Encodes `(tenantId, virtualTable, virtualHashValue)` into the composite
//! physical hash-key string used in shared-table mode, and reverses it.
//! The encoding is total and injective (§3): distinct triples map to
//! distinct strings, and parsing recovers the triple.

use crate::error::{Error, Result};
use crate::metadata::AttrType;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// A virtual hash-key value, already typed per the attribute's declared
/// `AttrType`. Stringified canonically before composition (§3): `N` uses
/// the exact numeric lexeme as given (the codec does not reformat
/// numbers), `B` uses unpadded standard base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashValue {
    S(String),
    N(String),
    B(Vec<u8>),
}

impl HashValue {
    fn canonical_text(&self) -> String {
        match self {
            HashValue::S(s) => s.clone(),
            HashValue::N(lexeme) => lexeme.clone(),
            HashValue::B(bytes) => base64::encode_config(bytes, base64::STANDARD_NO_PAD),
        }
    }

    /// Re-types a decoded canonical text back into a `HashValue` of the
    /// given attribute type. The inverse of `canonical_text`, used by
    /// table mapping to recover the original virtual hash-key value.
    pub fn from_canonical_text(attr_type: AttrType, text: &str) -> Result<HashValue> {
        match attr_type {
            AttrType::S => Ok(HashValue::S(text.to_string())),
            AttrType::N => Ok(HashValue::N(text.to_string())),
            AttrType::B => base64::decode_config(text, base64::STANDARD_NO_PAD)
                .map(HashValue::B)
                .map_err(|e| Error::MalformedPhysicalKey(e.to_string())),
        }
    }
}

/// Encodes/decodes the composite physical hash key. `delimiter` defaults
/// to `.`; any occurrence of it (or of `%`) inside `tenant_id` or
/// `virtual_table` is percent-escaped so that splitting the composed
/// string on a literal, unescaped delimiter always yields exactly two
/// interior boundaries. `table_prefix`, when configured, is a literal
/// string that every encoded key must begin with (for environment
/// isolation); decode rejects keys whose prefix does not match.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    delimiter: char,
    table_prefix: Option<String>,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self {
            delimiter: '.',
            table_prefix: None,
        }
    }
}

impl KeyCodec {
    pub fn new(delimiter: char, table_prefix: Option<String>) -> Self {
        Self {
            delimiter,
            table_prefix,
        }
    }

    pub fn encode(&self, tenant_id: &str, virtual_table: &str, value: &HashValue) -> String {
        let escape_set = escape_set(self.delimiter);
        let mut out = String::new();
        if let Some(prefix) = &self.table_prefix {
            out.push_str(prefix);
        }
        out.push_str(&utf8_percent_encode(tenant_id, &escape_set).to_string());
        out.push(self.delimiter);
        out.push_str(&utf8_percent_encode(virtual_table, &escape_set).to_string());
        out.push(self.delimiter);
        out.push_str(&utf8_percent_encode(&value.canonical_text(), &escape_set).to_string());
        out
    }

    /// Decodes a composite key back into `(tenantId, virtualTable, virtualHashValueText)`.
    /// The returned hash-value text is the canonical stringified form; the
    /// caller re-types it per the field's declared `AttrType`.
    pub fn decode(&self, physical: &str) -> Result<(String, String, String)> {
        let remainder = match &self.table_prefix {
            Some(prefix) => physical.strip_prefix(prefix.as_str()).ok_or_else(|| {
                Error::MalformedPhysicalKey(format!(
                    "key does not start with configured table prefix '{prefix}'"
                ))
            })?,
            None => physical,
        };

        let parts: Vec<&str> = remainder.split(self.delimiter).collect();
        if parts.len() != 3 {
            return Err(Error::MalformedPhysicalKey(format!(
                "expected exactly two unescaped '{}' delimiters, found {}",
                self.delimiter,
                parts.len().saturating_sub(1)
            )));
        }

        let tenant_id = percent_decode_str(parts[0])
            .decode_utf8()
            .map_err(|e| Error::MalformedPhysicalKey(e.to_string()))?
            .into_owned();
        let virtual_table = percent_decode_str(parts[1])
            .decode_utf8()
            .map_err(|e| Error::MalformedPhysicalKey(e.to_string()))?
            .into_owned();
        let value_text = percent_decode_str(parts[2])
            .decode_utf8()
            .map_err(|e| Error::MalformedPhysicalKey(e.to_string()))?
            .into_owned();

        Ok((tenant_id, virtual_table, value_text))
    }
}

/// The set of bytes we must escape so that a literal, unescaped delimiter
/// never appears inside an encoded component: the delimiter itself and `%`
/// (so percent-decoding of an *escaped* delimiter round-trips).
fn escape_set(delimiter: char) -> AsciiSet {
    let mut set = CONTROLS.add(b'%');
    if delimiter.is_ascii() {
        set = set.add(delimiter as u8);
    }
    set
}
