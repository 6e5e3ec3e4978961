//! DNS TXT rdata built from service TXT entries.

use super::CoderError;

const MAX_STRING_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxtEntry {
    /// `key=value`
    KeyValue { key: String, value: Vec<u8> },
    /// Boolean attribute: the key alone.
    Flag(String),
    /// Pre-encoded TXT data appended as is.
    Raw(Vec<u8>),
}

impl TxtEntry {
    pub fn key_value(key: &str, value: impl Into<Vec<u8>>) -> Self {
        Self::KeyValue {
            key: key.to_string(),
            value: value.into(),
        }
    }

    fn append_to(&self, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match self {
            Self::KeyValue { key, value } => {
                if key.is_empty() {
                    return Err(CoderError::InvalidArgs);
                }
                let len = key.len() + 1 + value.len();
                if len > MAX_STRING_LEN {
                    return Err(CoderError::InvalidArgs);
                }
                out.push(len as u8);
                out.extend_from_slice(key.as_bytes());
                out.push(b'=');
                out.extend_from_slice(value);
            }
            Self::Flag(key) => {
                if key.is_empty() || key.len() > MAX_STRING_LEN {
                    return Err(CoderError::InvalidArgs);
                }
                out.push(key.len() as u8);
                out.extend_from_slice(key.as_bytes());
            }
            Self::Raw(data) => out.extend_from_slice(data),
        }
        Ok(())
    }

    /// Serializes `entries` to TXT rdata. An empty result is a single
    /// zero-length string.
    pub fn encode_entries(entries: &[TxtEntry]) -> Result<Vec<u8>, CoderError> {
        let mut out = Vec::new();
        for entry in entries {
            entry.append_to(&mut out)?;
        }
        if out.is_empty() {
            out.push(0);
        }
        Ok(out)
    }
}
