//! Rich query documents.
//!
//! Queries use the CouchDB Mango shape: `selector`, `fields`, `sort`,
//! `bookmark` and `limit`. Any other top-level key is rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::Object;
use crate::error::CoreError;
use crate::keys::DOC_TYPE_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

/// A sort entry: either a bare field name or `{field: direction}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Field(String),
    Directed(BTreeMap<String, SortDirection>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    #[serde(default)]
    pub selector: Object,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn from_object(query: Object) -> Result<Self, CoreError> {
        serde_json::from_value(Value::Object(query))
            .map_err(|e| CoreError::BadRequest(format!("invalid query: {e}")))
    }

    /// Restrict the selector to one stored document type.
    pub fn restrict_doc_type(&mut self, storage_name: &str) {
        self.selector
            .insert(DOC_TYPE_KEY.into(), Value::String(storage_name.to_string()));
    }

    /// Sort entries normalised to `(field, direction)`.
    pub fn sort_fields(&self) -> Result<Vec<(String, SortDirection)>, CoreError> {
        let mut out = Vec::with_capacity(self.sort.len());
        for spec in &self.sort {
            match spec {
                SortSpec::Field(field) => out.push((field.clone(), SortDirection::Asc)),
                SortSpec::Directed(map) => {
                    if map.len() != 1 {
                        return Err(CoreError::BadRequest(
                            "each sort entry must name exactly one field".into(),
                        ));
                    }
                    out.extend(map.iter().map(|(f, d)| (f.clone(), *d)));
                }
            }
        }
        Ok(out)
    }

    /// Effective page size given the configured maximum; at least 1.
    pub fn page_size(&self, max: usize) -> usize {
        let max = max.max(1);
        self.limit.map_or(max, |limit| limit.clamp(1, max))
    }
}
