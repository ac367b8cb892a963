//! Input parser (verb module)
//!
//! YAML → runtime configuration and field catalogs, JSON → query requests.

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::config::RuntimeConfig;
use crate::error::ParseError;
use crate::query::{FieldCatalog, QueryRequest};

fn read_file<P: AsRef<Path>>(path: P) -> Result<String, ParseError> {
    let path_str = path.as_ref().display().to_string();
    std::fs::read_to_string(&path).map_err(|e| ParseError::Io {
        path: path_str,
        source: e,
    })
}

fn parse_yaml<T: DeserializeOwned>(yaml: &str) -> Result<T, ParseError> {
    // serde_yaml reads an empty document as null, not an empty mapping
    if yaml.trim().is_empty() {
        return serde_yaml::from_str("{}").map_err(ParseError::from);
    }
    serde_yaml::from_str(yaml).map_err(ParseError::from)
}

/// Parse runtime configuration from a YAML file
pub fn parse_config_file<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig, ParseError> {
    parse_config_str(&read_file(path)?)
}

/// Parse runtime configuration from a YAML string
pub fn parse_config_str(yaml: &str) -> Result<RuntimeConfig, ParseError> {
    parse_yaml(yaml)
}

/// Parse a field catalog (`fields: [...]`) from a YAML file
pub fn parse_catalog_file<P: AsRef<Path>>(path: P) -> Result<FieldCatalog, ParseError> {
    parse_catalog_str(&read_file(path)?)
}

/// Parse a field catalog from a YAML string
pub fn parse_catalog_str(yaml: &str) -> Result<FieldCatalog, ParseError> {
    serde_yaml::from_str(yaml).map_err(ParseError::from)
}

/// Parse a query request from a JSON file
pub fn parse_request_file<P: AsRef<Path>>(path: P) -> Result<QueryRequest, ParseError> {
    parse_request_str(&read_file(path)?)
}

/// Parse a query request from a JSON string
pub fn parse_request_str(json: &str) -> Result<QueryRequest, ParseError> {
    serde_json::from_str(json).map_err(ParseError::from)
}
