#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::keys::SUPERUSER_ROLE_ID;
use ledgerdoc_core::policy::StageMembers;
use ledgerdoc_core::query::Query;
use ledgerdoc_core::stage::Stage;
use ledgerdoc_engine::{blogic, Configuration, ConfigurationBuilder, EngineSettings, IdFunc};
use ledgerdoc_engine::{Engine, Request, TxContext};
use ledgerdoc_store::MemoryLedger;

pub const MANAGER: &[u8] = b"-----BEGIN CERTIFICATE-----\nmanager\n-----END CERTIFICATE-----";
pub const ALICE: &[u8] = b"-----BEGIN CERTIFICATE-----\nalice\n-----END CERTIFICATE-----";
pub const BOB: &[u8] = b"-----BEGIN CERTIFICATE-----\nbob\n-----END CERTIFICATE-----";

pub const INCIDENT_ID: &str = "6b1f3a52-0d4e-4c1a-9f0b-8e2d7c6a5b41";
pub const WORKNOTE_ID: &str = "3c9e8d7f-6a5b-4c3d-8e1f-0a9b8c7d6e5f";
pub const MISSING_ID: &str = "00000000-1111-4222-8333-444444444444";

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

pub fn fingerprint(certificate: &[u8]) -> String {
    IdFunc::Sha512.fingerprint(certificate)
}

pub fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn request(certificate: &[u8]) -> Request {
    Request::new(certificate.to_vec(), timestamp())
}

pub fn obj(value: Value) -> Object {
    value.as_object().cloned().expect("test value must be an object")
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

fn item(destination: &str, schema: Value) -> Value {
    json!({"destination": destination, "schema": schema})
}

pub fn incident_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "description": {"type": "string"},
            "worknotes": {
                "type": "array",
                "description": "REF->MOCKWORKNOTE",
                "items": {"type": "string"}
            },
            "parent": {"type": "string", "description": "REF->MOCKINCIDENT"},
            "related": {"type": "string", "description": "ENTITYREF"},
            "blacklisted": {"type": "string", "description": "REF->MOCKBLACKLISTED"}
        },
        "required": ["description"]
    })
}

/// Second version of the incident schema, adding `severity`.
pub fn incident_schema_v2() -> Value {
    let mut schema = incident_schema();
    schema["properties"]["severity"] = json!({"type": "string", "enum": ["low", "high"]});
    schema
}

pub fn registries() -> Value {
    json!({
        "mockincident": item("state", incident_schema()),
        "mockworknote": item("state", json!({
            "type": "object",
            "properties": {"text": {"type": "string"}}
        })),
        "mockrequest": item("private_data", json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "number": {"type": "integer"}
            }
        })),
        "mocklevel1": item("state", json!({
            "type": "object",
            "properties": {"level2": {"type": "string", "description": "REF->MOCKLEVEL2"}}
        })),
        "mocklevel2": item("state", json!({
            "type": "object",
            "properties": {"level3": {"type": "string", "description": "REF->MOCKLEVEL3"}}
        })),
        "mocklevel3": item("state", json!({
            "type": "object",
            "properties": {"name": {"type": "string"}}
        })),
        "mockreffieldblacklist": item("state", json!({
            "type": "object",
            "properties": {
                "ref": {"type": "string", "description": "REF->MOCKWORKNOTE"},
                "other": {"type": "string", "description": "REF->MOCKWORKNOTE"},
                "nested": {
                    "type": "object",
                    "properties": {
                        "inner": {"type": "string", "description": "REF->MOCKWORKNOTE"}
                    }
                }
            }
        })),
        "mockblogicfail": item("state", json!({
            "type": "object",
            "properties": {"name": {"type": "string"}}
        }))
    })
}

// ---------------------------------------------------------------------------
// Business logic
// ---------------------------------------------------------------------------

/// Numbers requests sequentially.
fn number_request(ctx: &mut TxContext, _pre: Option<&Object>, mut post: Object) -> Result<Object, CoreError> {
    let (existing, _) = ctx.query_assets("mockrequest", Query::default(), false)?;
    post.insert("number".into(), json!(existing.len() + 1));
    Ok(post)
}

/// Records the request data seen while resolving.
fn tag_resolved(_ctx: &mut TxContext, pre: Option<&Object>, mut post: Object) -> Result<Object, CoreError> {
    let lang = pre.and_then(|data| data.get("lang")).cloned().unwrap_or(Value::Null);
    post.insert("resolved_lang".into(), lang);
    Ok(post)
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        resolve_blacklist: vec!["mockblacklisted".into()],
        ..Default::default()
    }
}

/// Builder with the mock business policies registered.
pub fn builder(settings: EngineSettings) -> ConfigurationBuilder {
    Configuration::builder(settings)
        .business_policy(
            "mockincident",
            -1,
            StageMembers::new()
                .on(Stage::BeforeCreate, blogic::enforce_create)
                .on(Stage::BeforeUpdate, blogic::enforce_update)
                .on(Stage::BeforeDelete, blogic::enforce_delete)
                .on(Stage::AfterGet, blogic::enforce_read)
                .on(Stage::AfterQuery, blogic::filter_read),
        )
        .business_policy(
            "mockrequest",
            -1,
            StageMembers::new().on(Stage::BeforeCreate, number_request),
        )
        .business_policy(
            "mockworknote",
            -1,
            StageMembers::new().on(Stage::AfterResolve, tag_resolved),
        )
        .business_policy(
            "mockblogicfail",
            -1,
            StageMembers::new().on(Stage::BeforeCreate, blogic::deny),
        )
        .field_blacklist("mockreffieldblacklist", "ref")
}

pub fn engine() -> Engine<MemoryLedger> {
    Engine::new(MemoryLedger::new(), builder(settings()).build())
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

pub fn call(engine: &Engine<MemoryLedger>, certificate: &[u8], payload: Value) -> Result<Value, CoreError> {
    engine.handle(&request(certificate), payload)
}

/// Call that must succeed.
pub fn ok(engine: &Engine<MemoryLedger>, certificate: &[u8], payload: Value) -> Value {
    let method = payload["method"].clone();
    match call(engine, certificate, payload) {
        Ok(response) => response,
        Err(e) => panic!("{method} failed: {e}"),
    }
}

/// Init with the mock registries and register the manager as superuser.
pub fn bootstrap(engine: &Engine<MemoryLedger>) {
    let input = obj(json!({
        "init_manager": fingerprint(MANAGER),
        "registries": registries()
    }));
    engine.init(&request(MANAGER), input).expect("init");
    let me = ok(engine, MANAGER, json!({"method": "identityAddMe"}));
    assert_eq!(me["result"]["roles"], json!([SUPERUSER_ROLE_ID]));
}

/// Register `certificate` as a plain identity.
pub fn add_me(engine: &Engine<MemoryLedger>, certificate: &[u8]) -> Value {
    ok(engine, certificate, json!({"method": "identityAddMe"}))["result"].clone()
}

/// Create a role with `grants` and grant it to `certificate`.
pub fn grant(engine: &Engine<MemoryLedger>, certificate: &[u8], grants: Value) -> String {
    let role = ok(
        engine,
        MANAGER,
        json!({"method": "roleCreate", "data": {"name": "test role", "grants": grants}}),
    );
    let role_id = role["result"]["uuid"].as_str().expect("role uuid").to_string();

    let identity = ok(
        engine,
        MANAGER,
        json!({"method": "identityGet", "fingerprint": fingerprint(certificate)}),
    );
    let mut roles = identity["result"]["roles"].as_array().cloned().unwrap_or_default();
    roles.push(json!(role_id));
    ok(
        engine,
        MANAGER,
        json!({
            "method": "identityUpdate",
            "fingerprint": fingerprint(certificate),
            "patch": {"roles": roles}
        }),
    );
    role_id
}

pub fn create_incident(engine: &Engine<MemoryLedger>, certificate: &[u8], data: Value) -> Value {
    ok(
        engine,
        certificate,
        json!({"method": "assetCreate", "name": "mockincident", "data": data}),
    )["result"]
        .clone()
}
