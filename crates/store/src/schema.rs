//! Built-in schemas and schema augmentation.
//!
//! Every registered schema is extended with the service keys of its
//! document type and with the shared `definitions` before it validates an
//! asset, so user schemas may `$ref` `#/definitions/grant`,
//! `#/definitions/overrides` and the rest.

use ledgerdoc_core::asset::{id_key, storage_name, Object};
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::keys::{DOC_TYPE_KEY, FINGERPRINT_KEY, UUID_KEY, VERSION_KEY};
use serde_json::{json, Value};

/// Shared definitions injected into every schema.
pub fn definitions() -> Value {
    json!({
        "uuid": {
            "type": "string",
            "pattern": "^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
        },
        "fingerprint": {"type": "string", "pattern": "^[0-9a-f]+$"},
        "object": {"type": "string", "minLength": 1},
        "effect": {"type": "string", "enum": ["allow", "deny"]},
        "action": {"type": "string", "pattern": "^[a-z-_]*$"},
        "grant": {
            "type": "object",
            "properties": {
                "object": {"$ref": "#/definitions/object"},
                "action": {"$ref": "#/definitions/action"}
            },
            "required": ["object", "action"],
            "additionalProperties": false
        },
        "override": {
            "type": "object",
            "properties": {
                "subject": {"$ref": "#/definitions/fingerprint"},
                "action": {"$ref": "#/definitions/action"},
                "effect": {"$ref": "#/definitions/effect"}
            },
            "required": ["subject", "action", "effect"],
            "additionalProperties": false
        },
        "grants": {"type": "array", "items": {"$ref": "#/definitions/grant"}},
        "overrides": {"type": "array", "items": {"$ref": "#/definitions/override"}},
        "entity": {"type": "string", "pattern": "^[A-Za-z0-9_]+:[^:]+$"}
    })
}

pub fn identity_schema() -> Value {
    json!({
        "title": "identity",
        "type": "object",
        "properties": {
            "fingerprint": {"$ref": "#/definitions/fingerprint"},
            "roles": {
                "type": "array",
                "description": "REF->ROLE roles granted to this identity",
                "items": {"$ref": "#/definitions/uuid"}
            },
            "users": {
                "type": "array",
                "description": "REF->USER users linked to this identity",
                "items": {"type": "string"}
            },
            "overrides": {"$ref": "#/definitions/overrides"},
            "is_enabled": {"type": "boolean"},
            "org_name": {"type": "string"}
        },
        "required": ["fingerprint", "is_enabled", "docType", "xxx_version"],
        "additionalProperties": true
    })
}

pub fn role_schema() -> Value {
    json!({
        "title": "role",
        "type": "object",
        "properties": {
            "name": {"type": "string", "minLength": 1},
            "grants": {"$ref": "#/definitions/grants"},
            "overrides": {"$ref": "#/definitions/overrides"},
            "is_system": {"type": "boolean"}
        },
        "required": ["name"],
        "additionalProperties": false
    })
}

/// Shape of a registry item accepted by upserts.
pub fn registry_item_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "destination": {"type": "string", "enum": ["state", "private_data"]},
            "schema": {"type": "object"}
        },
        "required": ["destination", "schema"],
        "additionalProperties": false
    })
}

/// Shape of a singleton accepted by upserts.
pub fn singleton_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"value": {"type": "object"}},
        "required": ["value"],
        "additionalProperties": false
    })
}

/// Shape of the bootstrap document.
pub fn init_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "init_manager": {"type": "string", "minLength": 1},
            "registries": {"type": "object", "additionalProperties": registry_item_schema()},
            "singletons": {"type": "object", "additionalProperties": singleton_schema()}
        },
        "additionalProperties": false
    })
}

/// Copy of `schema` with service keys and shared definitions added.
pub fn augment(name: &str, schema: &Value) -> Result<Value, CoreError> {
    let mut schema = schema.clone();
    let root = schema
        .as_object_mut()
        .ok_or_else(|| CoreError::BadRequest(format!("schema for: {name} is not an object")))?;

    let properties = root
        .entry("properties")
        .or_insert_with(|| Value::Object(Object::new()));
    let properties = properties
        .as_object_mut()
        .ok_or_else(|| CoreError::BadRequest(format!("schema for: {name} has invalid properties")))?;

    properties.insert(
        DOC_TYPE_KEY.into(),
        json!({"type": "string", "enum": [storage_name(name)]}),
    );
    properties.insert(VERSION_KEY.into(), json!({"type": "integer", "minimum": 1}));
    match id_key(name) {
        FINGERPRINT_KEY => {
            properties.insert(
                FINGERPRINT_KEY.into(),
                json!({"$ref": "#/definitions/fingerprint"}),
            );
        }
        _ => {
            properties.insert(UUID_KEY.into(), json!({"$ref": "#/definitions/uuid"}));
        }
    }

    let definitions_slot = root
        .entry("definitions")
        .or_insert_with(|| Value::Object(Object::new()));
    if let (Some(target), Value::Object(shared)) = (definitions_slot.as_object_mut(), definitions()) {
        for (key, value) in shared {
            target.entry(key).or_insert(value);
        }
    }
    Ok(schema)
}

/// Validate `instance` against `schema`.
///
/// `what` names the validated thing in the error message.
pub fn validate(schema: &Value, instance: &Value, what: &str) -> Result<(), CoreError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| CoreError::BadRequest(format!("schema for: {what} is not a valid JSON schema: {e}")))?;

    let mut errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    errors.sort();
    Err(CoreError::BadRequest(format!(
        "schema validation failed on: {what}: {}",
        errors.join("; ")
    )))
}

/// Check that a schema compiles and describes an object.
pub fn check_schema(name: &str, schema: &Value) -> Result<(), CoreError> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(CoreError::BadRequest(format!(
            "schema for: {name}: type on top level is not: object"
        )));
    }
    let augmented = augment(name, schema)?;
    jsonschema::validator_for(&augmented)
        .map(|_| ())
        .map_err(|e| CoreError::BadRequest(format!("schema for: {name} is not a valid JSON schema: {e}")))
}
