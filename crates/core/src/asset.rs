//! Asset documents and their service keys.
//!
//! An asset is a plain JSON object carrying three service keys: the
//! upper-case document type, the schema version and a primary id (`uuid`, or
//! `fingerprint` for identities). Everything else is business data governed
//! by the registered schema.

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::keys::{
    DOC_TYPE_KEY, FINGERPRINT_KEY, IDENTITY_ASSET, SERVICE_KEYS, UUID_KEY, VERSION_KEY,
};

/// JSON object as handled by every layer of the engine.
pub type Object = Map<String, Value>;

/// Name of the primary id key for a document type.
pub fn id_key(name: &str) -> &'static str {
    if name.eq_ignore_ascii_case(IDENTITY_ASSET) {
        FINGERPRINT_KEY
    } else {
        UUID_KEY
    }
}

/// Stored form of a document type.
pub fn storage_name(name: &str) -> String {
    name.to_uppercase()
}

/// Permission object of a single asset instance.
pub fn permission_object(name: &str, id: &str) -> String {
    format!("/{}/{}", name.to_lowercase(), id)
}

/// Bare asset carrying only service keys.
pub fn make_bare_asset(name: &str, id: &str, version: i64) -> Object {
    let mut asset = Object::new();
    asset.insert(DOC_TYPE_KEY.into(), Value::String(storage_name(name)));
    asset.insert(VERSION_KEY.into(), Value::from(version));
    asset.insert(id_key(name).into(), Value::String(id.to_string()));
    asset
}

/// Parse a JSON value that must be an object.
pub fn object_from_value(value: Value) -> Result<Object, CoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::BadRequest(format!(
            "expected JSON object, got: {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// AssetExt
// ---------------------------------------------------------------------------

/// Typed accessors over an asset object.
pub trait AssetExt {
    /// Lower-case document type.
    fn doc_type(&self) -> Result<String, CoreError>;

    fn version(&self) -> Result<i64, CoreError>;

    /// Primary id, read from the id key matching the document type.
    fn asset_id(&self) -> Result<String, CoreError>;

    /// `/<docType>/<id>`.
    fn permission_object(&self) -> Result<String, CoreError>;

    /// True when all service keys needed to address the asset are present.
    fn is_asset(&self) -> bool;

    /// True when any service key is present.
    fn has_service_keys(&self) -> bool;

    fn str_field(&self, key: &str) -> Result<&str, CoreError>;

    fn bool_field(&self, key: &str) -> Result<bool, CoreError>;

    /// Array of strings; a missing key reads as empty.
    fn string_list(&self, key: &str) -> Result<Vec<String>, CoreError>;
}

impl AssetExt for Object {
    fn doc_type(&self) -> Result<String, CoreError> {
        Ok(self.str_field(DOC_TYPE_KEY)?.to_lowercase())
    }

    fn version(&self) -> Result<i64, CoreError> {
        self.get(VERSION_KEY)
            .and_then(Value::as_i64)
            .ok_or_else(|| CoreError::BadRequest(format!("key '{VERSION_KEY}' is missing or not an integer")))
    }

    fn asset_id(&self) -> Result<String, CoreError> {
        let name = self.doc_type()?;
        Ok(self.str_field(id_key(&name))?.to_string())
    }

    fn permission_object(&self) -> Result<String, CoreError> {
        Ok(permission_object(&self.doc_type()?, &self.asset_id()?))
    }

    fn is_asset(&self) -> bool {
        self.doc_type().is_ok() && self.version().is_ok() && self.asset_id().is_ok()
    }

    fn has_service_keys(&self) -> bool {
        SERVICE_KEYS.iter().any(|k| self.contains_key(*k))
    }

    fn str_field(&self, key: &str) -> Result<&str, CoreError> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::BadRequest(format!("key '{key}' is missing or not a string")))
    }

    fn bool_field(&self, key: &str) -> Result<bool, CoreError> {
        self.get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| CoreError::BadRequest(format!("key '{key}' is missing or not a boolean")))
    }

    fn string_list(&self, key: &str) -> Result<Vec<String>, CoreError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        CoreError::BadRequest(format!("key '{key}' must contain only strings"))
                    })
                })
                .collect(),
            Some(_) => Err(CoreError::BadRequest(format!("key '{key}' is not an array"))),
        }
    }
}
