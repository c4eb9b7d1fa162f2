//! Credentials File
//!
//! The driver's array list is mounted from a secret as a JSON (or YAML)
//! document:
//!
//! ```json
//! {
//!   "storageArrayList": [
//!     {
//!       "arrayId": "APM00123",
//!       "username": "admin",
//!       "password": "secret",
//!       "restGateway": "https://10.0.0.1",
//!       "insecure": true,
//!       "isDefaultArray": true
//!     }
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Parsed credentials document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsFile {
    #[serde(default)]
    pub storage_array_list: Vec<ArrayEntry>,
}

/// One array entry of the credentials document
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayEntry {
    #[serde(default)]
    pub array_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// REST endpoint of the array
    #[serde(default)]
    pub rest_gateway: String,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,
    /// Array that legacy single-token volume ids resolve to
    #[serde(default)]
    pub is_default_array: bool,
}

impl std::fmt::Debug for ArrayEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayEntry")
            .field("array_id", &self.array_id)
            .field("username", &self.username)
            .field("password", &"*******")
            .field("rest_gateway", &self.rest_gateway)
            .field("insecure", &self.insecure)
            .field("is_default_array", &self.is_default_array)
            .finish()
    }
}

impl ArrayEntry {
    fn check_required(&self, index: usize) -> Result<()> {
        let required = [
            ("ArrayID", &self.array_id),
            ("Username", &self.username),
            ("Password", &self.password),
            ("RestGateway", &self.rest_gateway),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(Error::ConfigValidation { index, field });
            }
        }
        Ok(())
    }
}

/// Serialization format of a credentials file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsFormat {
    Json,
    Yaml,
}

impl CredentialsFormat {
    /// `.yaml`/`.yml` files are YAML, everything else is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                CredentialsFormat::Yaml
            }
            _ => CredentialsFormat::Json,
        }
    }
}

/// Parse raw file content
pub fn parse(content: &[u8], format: CredentialsFormat) -> Result<CredentialsFile> {
    let text = std::str::from_utf8(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(Error::ConfigEmpty);
    }

    match format {
        CredentialsFormat::Json => {
            serde_json::from_str(text).map_err(|e| Error::ConfigParse(e.to_string()))
        }
        CredentialsFormat::Yaml => {
            serde_yaml::from_str(text).map_err(|e| Error::ConfigParse(e.to_string()))
        }
    }
}

impl CredentialsFile {
    /// Validate every entry, returning them with normalized ids.
    ///
    /// The first violation aborts the whole file.
    pub fn validate(self) -> Result<Vec<ArrayEntry>> {
        if self.storage_array_list.is_empty() {
            return Err(Error::ConfigEmpty);
        }

        let mut seen = HashSet::with_capacity(self.storage_array_list.len());
        let mut defaults = 0usize;
        let mut entries = Vec::with_capacity(self.storage_array_list.len());

        for (index, mut entry) in self.storage_array_list.into_iter().enumerate() {
            entry.check_required(index)?;
            entry.array_id = entry.array_id.to_lowercase();

            if !seen.insert(entry.array_id.clone()) {
                return Err(Error::ConfigDuplicate {
                    array_id: entry.array_id,
                });
            }

            if entry.is_default_array {
                defaults += 1;
                if defaults > 1 {
                    return Err(Error::ConfigDefaultConflict {
                        array_id: entry.array_id,
                    });
                }
            }

            entries.push(entry);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const TWO_ARRAYS: &str = r#"{
        "storageArrayList": [
            {"arrayId": "APM001", "username": "admin", "password": "pw", "restGateway": "https://10.0.0.1", "isDefaultArray": true},
            {"arrayId": "apm002", "username": "admin", "password": "pw", "restGateway": "https://10.0.0.2", "insecure": true}
        ]
    }"#;

    #[test]
    fn test_parse_json() {
        let file = parse(TWO_ARRAYS.as_bytes(), CredentialsFormat::Json).unwrap();
        assert_eq!(file.storage_array_list.len(), 2);
        assert!(file.storage_array_list[0].is_default_array);
        assert!(!file.storage_array_list[0].insecure);
        assert!(file.storage_array_list[1].insecure);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
storageArrayList:
  - arrayId: APM001
    username: admin
    password: pw
    restGateway: https://10.0.0.1
    isDefaultArray: true
"#;
        let file = parse(yaml.as_bytes(), CredentialsFormat::Yaml).unwrap();
        assert_eq!(file.storage_array_list[0].array_id, "APM001");
        assert_eq!(file.storage_array_list[0].rest_gateway, "https://10.0.0.1");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(CredentialsFormat::from_path(Path::new("/c/config.yaml")), CredentialsFormat::Yaml);
        assert_eq!(CredentialsFormat::from_path(Path::new("/c/config.YML")), CredentialsFormat::Yaml);
        assert_eq!(CredentialsFormat::from_path(Path::new("/c/config.json")), CredentialsFormat::Json);
        assert_eq!(CredentialsFormat::from_path(Path::new("/c/config")), CredentialsFormat::Json);
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(parse(b"", CredentialsFormat::Json), Err(Error::ConfigEmpty));
        assert_matches!(parse(b"  \n", CredentialsFormat::Json), Err(Error::ConfigEmpty));
        assert_matches!(parse(b"{not json", CredentialsFormat::Json), Err(Error::ConfigParse(_)));
        assert_matches!(
            parse(br#"{"storageArrayList": "nope"}"#, CredentialsFormat::Json),
            Err(Error::ConfigParse(_))
        );
    }

    #[test]
    fn test_validate_normalizes_ids() {
        let file = parse(TWO_ARRAYS.as_bytes(), CredentialsFormat::Json).unwrap();
        let entries = file.validate().unwrap();
        assert_eq!(entries[0].array_id, "apm001");
        assert_eq!(entries[1].array_id, "apm002");
    }

    #[test]
    fn test_validate_empty_list() {
        let file = parse(br#"{"storageArrayList": []}"#, CredentialsFormat::Json).unwrap();
        assert_matches!(file.validate(), Err(Error::ConfigEmpty));

        let file = parse(b"{}", CredentialsFormat::Json).unwrap();
        assert_matches!(file.validate(), Err(Error::ConfigEmpty));
    }

    #[test]
    fn test_validate_missing_fields() {
        let json = r#"{"storageArrayList": [
            {"arrayId": "apm001", "username": "admin", "password": "pw", "restGateway": "https://a"},
            {"arrayId": "apm002", "username": "admin", "password": "", "restGateway": "https://b"}
        ]}"#;
        let file = parse(json.as_bytes(), CredentialsFormat::Json).unwrap();
        assert_matches!(
            file.validate(),
            Err(Error::ConfigValidation { index: 1, field: "Password" })
        );

        let json = r#"{"storageArrayList": [{"username": "admin", "password": "pw", "restGateway": "https://a"}]}"#;
        let file = parse(json.as_bytes(), CredentialsFormat::Json).unwrap();
        assert_matches!(
            file.validate(),
            Err(Error::ConfigValidation { index: 0, field: "ArrayID" })
        );

        let json = r#"{"storageArrayList": [{"arrayId": "a", "username": "admin", "password": "pw"}]}"#;
        let file = parse(json.as_bytes(), CredentialsFormat::Json).unwrap();
        assert_matches!(
            file.validate(),
            Err(Error::ConfigValidation { index: 0, field: "RestGateway" })
        );
    }

    #[test]
    fn test_validate_accepts_whitespace_values() {
        let json = r#"{"storageArrayList": [
            {"arrayId": "apm001", "username": "admin", "password": "  ", "restGateway": "https://a", "isDefaultArray": true}
        ]}"#;
        let file = parse(json.as_bytes(), CredentialsFormat::Json).unwrap();
        let entries = file.validate().unwrap();
        assert_eq!(entries[0].password, "  ");
    }

    #[test]
    fn test_validate_duplicate_ids_case_insensitive() {
        let json = r#"{"storageArrayList": [
            {"arrayId": "APM001", "username": "u", "password": "p", "restGateway": "https://a"},
            {"arrayId": "apm001", "username": "u", "password": "p", "restGateway": "https://b"}
        ]}"#;
        let file = parse(json.as_bytes(), CredentialsFormat::Json).unwrap();
        assert_matches!(
            file.validate(),
            Err(Error::ConfigDuplicate { array_id }) if array_id == "apm001"
        );
    }

    #[test]
    fn test_validate_multiple_defaults() {
        let json = r#"{"storageArrayList": [
            {"arrayId": "a1", "username": "u", "password": "p", "restGateway": "https://a", "isDefaultArray": true},
            {"arrayId": "a2", "username": "u", "password": "p", "restGateway": "https://b", "isDefaultArray": true}
        ]}"#;
        let file = parse(json.as_bytes(), CredentialsFormat::Json).unwrap();
        assert_matches!(
            file.validate(),
            Err(Error::ConfigDefaultConflict { array_id }) if array_id == "a2"
        );
    }

    #[test]
    fn test_validate_zero_defaults_allowed() {
        let json = r#"{"storageArrayList": [
            {"arrayId": "a1", "username": "u", "password": "p", "restGateway": "https://a"}
        ]}"#;
        let file = parse(json.as_bytes(), CredentialsFormat::Json).unwrap();
        let entries = file.validate().unwrap();
        assert!(!entries[0].is_default_array);
    }

    #[test]
    fn test_entry_debug_masks_password() {
        let entry = ArrayEntry {
            array_id: "a1".into(),
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", entry).contains("hunter2"));
    }
}
