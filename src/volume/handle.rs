//! Volume Handles
//!
//! A volume id handed to the orchestrator names the array and transport the
//! volume lives on:
//!
//! ```text
//! <name>-<protocol>-<arrayId>-<nativeId>
//! ```
//!
//! The structural fields are read from the right, so the name may itself
//! contain dashes. Volumes created before multi-array support carry a bare
//! native id with no dashes; those resolve to the default array and an
//! unknown protocol. The protocol field is kept verbatim, so ids naming a
//! transport this driver does not recognize still decode.

use crate::array::{ArrayId, Generation};
use crate::domain::ports::Protocol;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Field delimiter
pub const DELIMITER: char = '-';

/// Structure of a raw volume id, before any registry lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedId {
    /// Pre-multi-array id: just the array's native id
    Legacy { native_id: String },
    Composite(VolumeHandle),
}

/// A volume id resolved to its array, protocol and native id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeHandle {
    /// Volume name prefix; absent for legacy ids
    name: Option<String>,
    protocol: Protocol,
    /// Protocol field exactly as it appears in the id
    protocol_token: String,
    array_id: ArrayId,
    native_id: String,
}

impl VolumeHandle {
    /// Encode a new composite id.
    ///
    /// Array and native ids must be non-empty and dash-free so the id
    /// decodes back to the same fields.
    pub fn encode(name: &str, protocol: Protocol, array_id: &ArrayId, native_id: &str) -> Result<String> {
        let invalid = |reason: &str| Error::MalformedIdentifier {
            id: format!("{}-{}-{}-{}", name, protocol, array_id, native_id),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("empty volume name"));
        }
        if array_id.as_str().is_empty() || array_id.as_str().contains(DELIMITER) {
            return Err(invalid("array id must be non-empty and contain no dashes"));
        }
        if native_id.is_empty() || native_id.contains(DELIMITER) {
            return Err(invalid("native id must be non-empty and contain no dashes"));
        }

        Ok(format!(
            "{name}{d}{protocol}{d}{array_id}{d}{native_id}",
            d = DELIMITER
        ))
    }

    /// Split a raw id into its fields without consulting any registry
    pub fn parse(raw: &str) -> Result<ParsedId> {
        let malformed = |reason: &str| Error::MalformedIdentifier {
            id: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(malformed("empty volume id"));
        }
        if !raw.contains(DELIMITER) {
            return Ok(ParsedId::Legacy {
                native_id: raw.to_string(),
            });
        }

        let mut fields = raw.rsplitn(4, DELIMITER);
        let native_id = fields.next().unwrap_or_default();
        let array_id = fields.next().unwrap_or_default();
        let protocol = fields.next().unwrap_or_default();
        let name = fields
            .next()
            .ok_or_else(|| malformed("expected <name>-<protocol>-<arrayId>-<nativeId>"))?;

        if name.is_empty() {
            return Err(malformed("empty volume name"));
        }
        if array_id.is_empty() {
            return Err(malformed("empty array id"));
        }
        if native_id.is_empty() {
            return Err(malformed("empty native id"));
        }
        if protocol.is_empty() {
            return Err(malformed("empty protocol"));
        }

        Ok(ParsedId::Composite(VolumeHandle {
            name: Some(name.to_string()),
            protocol: protocol.parse().unwrap_or(Protocol::Unknown),
            protocol_token: protocol.to_string(),
            array_id: ArrayId::new(array_id),
            native_id: native_id.to_string(),
        }))
    }

    /// Decode a raw id against one registry generation.
    ///
    /// Legacy ids resolve to that generation's default array. The array of
    /// a composite id is not looked up here.
    pub fn decode(raw: &str, generation: &Generation) -> Result<Self> {
        match Self::parse(raw)? {
            ParsedId::Composite(handle) => Ok(handle),
            ParsedId::Legacy { native_id } => {
                let default = generation.default_array().ok_or(Error::NoDefaultArray)?;
                Ok(VolumeHandle {
                    name: None,
                    protocol: Protocol::Unknown,
                    protocol_token: Protocol::Unknown.as_str().to_string(),
                    array_id: default.id().clone(),
                    native_id,
                })
            }
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Recognized transport; `Unknown` when the field names anything else
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn protocol_token(&self) -> &str {
        &self.protocol_token
    }

    pub fn array_id(&self) -> &ArrayId {
        &self.array_id
    }

    pub fn native_id(&self) -> &str {
        &self.native_id
    }

    pub fn is_legacy(&self) -> bool {
        self.name.is_none()
    }
}

impl std::fmt::Display for VolumeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(
                f,
                "{name}{d}{}{d}{}{d}{}",
                self.protocol_token,
                self.array_id,
                self.native_id,
                d = DELIMITER
            ),
            None => write!(f, "{}", self.native_id),
        }
    }
}
