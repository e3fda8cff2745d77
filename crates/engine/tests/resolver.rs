//! Integration tests for reference validation on write and reference
//! resolution on read.

mod common;

use assert_matches::assert_matches;
use common::{bootstrap, builder, call, create_incident, engine, ok, settings};
use common::{INCIDENT_ID, MANAGER, MISSING_ID, WORKNOTE_ID};
use ledgerdoc_core::error::{CoreError, Status};
use ledgerdoc_engine::{Engine, EngineSettings};
use ledgerdoc_store::MemoryLedger;
use serde_json::{json, Value};

const LEVEL1_ID: &str = "11111111-1111-4111-8111-111111111111";
const LEVEL2_ID: &str = "22222222-2222-4222-8222-222222222222";
const LEVEL3_ID: &str = "33333333-3333-4333-8333-333333333333";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create(engine: &Engine<MemoryLedger>, name: &str, id: &str, data: Value) -> Value {
    ok(
        engine,
        MANAGER,
        json!({"method": "assetCreate", "name": name, "id": id, "data": data}),
    )["result"]
        .clone()
}

fn get_resolved(engine: &Engine<MemoryLedger>, name: &str, id: &str) -> Value {
    ok(
        engine,
        MANAGER,
        json!({"method": "assetGet", "name": name, "id": id, "resolve": true}),
    )["result"]
        .clone()
}

fn create_worknote(engine: &Engine<MemoryLedger>) {
    create(engine, "mockworknote", WORKNOTE_ID, json!({"text": "called vendor"}));
}

fn create_levels(engine: &Engine<MemoryLedger>) {
    create(engine, "mocklevel3", LEVEL3_ID, json!({"name": "leaf"}));
    create(engine, "mocklevel2", LEVEL2_ID, json!({"level3": LEVEL3_ID}));
    create(engine, "mocklevel1", LEVEL1_ID, json!({"level2": LEVEL2_ID}));
}

// ---------------------------------------------------------------------------
// Test: writes with missing targets are rejected
// ---------------------------------------------------------------------------

#[test]
fn test_broken_reference_rejects_create() {
    let engine = engine();
    bootstrap(&engine);

    let err = call(
        &engine,
        MANAGER,
        json!({
            "method": "assetCreate",
            "name": "mockincident",
            "id": INCIDENT_ID,
            "data": {"description": "x", "worknotes": [MISSING_ID]}
        }),
    )
    .unwrap_err();
    assert_eq!(err.status(), Status::BadRequest);
    assert!(err.to_string().contains(&format!(
        "Referenced asset 'mockworknote' with ID '{MISSING_ID}' not found \
         (currently resolved asset name: mockincident, uuid: {INCIDENT_ID})"
    )));
}

#[test]
fn test_broken_references_are_collected_and_sorted() {
    let engine = engine();
    bootstrap(&engine);

    let err = call(
        &engine,
        MANAGER,
        json!({
            "method": "assetCreate",
            "name": "mockincident",
            "data": {
                "description": "x",
                "worknotes": [MISSING_ID, "ffffffff-1111-4222-8333-444444444444", MISSING_ID],
                "parent": "eeeeeeee-1111-4222-8333-444444444444"
            }
        }),
    )
    .unwrap_err();
    assert_matches!(err.root(), CoreError::BrokenReferences(refs) if refs.len() == 3);
    if let CoreError::BrokenReferences(refs) = err.root() {
        let mut sorted = refs.clone();
        sorted.sort();
        assert_eq!(*refs, sorted);
    }
}

#[test]
fn test_self_reference_is_allowed() {
    let engine = engine();
    bootstrap(&engine);

    create_incident(
        &engine,
        MANAGER,
        json!({"uuid": INCIDENT_ID, "description": "loop", "parent": INCIDENT_ID}),
    );
    let resolved = get_resolved(&engine, "mockincident", INCIDENT_ID);
    assert_eq!(resolved["parent"]["uuid"], INCIDENT_ID);
    assert_eq!(resolved["parent"]["parent"], INCIDENT_ID);
}

#[test]
fn test_blacklisted_target_is_not_checked() {
    let engine = engine();
    bootstrap(&engine);

    create_incident(
        &engine,
        MANAGER,
        json!({"uuid": INCIDENT_ID, "description": "x", "blacklisted": MISSING_ID}),
    );
    let resolved = get_resolved(&engine, "mockincident", INCIDENT_ID);
    assert_eq!(resolved["blacklisted"], MISSING_ID);
}

#[test]
fn test_malformed_entity_reference_is_unprocessable() {
    let engine = engine();
    bootstrap(&engine);

    let err = call(
        &engine,
        MANAGER,
        json!({
            "method": "assetCreate",
            "name": "mockincident",
            "data": {"description": "x", "related": "no-separator"}
        }),
    )
    .unwrap_err();
    assert_eq!(err.status(), Status::UnprocessableEntity);
}

// ---------------------------------------------------------------------------
// Test: resolution inlines targets
// ---------------------------------------------------------------------------

#[test]
fn test_resolve_inlines_array_references() {
    let engine = engine();
    bootstrap(&engine);
    create_worknote(&engine);
    create_incident(
        &engine,
        MANAGER,
        json!({"uuid": INCIDENT_ID, "description": "x", "worknotes": [WORKNOTE_ID]}),
    );

    let plain = ok(
        &engine,
        MANAGER,
        json!({"method": "assetGet", "name": "mockincident", "id": INCIDENT_ID}),
    );
    assert_eq!(plain["result"]["worknotes"], json!([WORKNOTE_ID]));

    let resolved = ok(
        &engine,
        MANAGER,
        json!({
            "method": "assetGet",
            "name": "mockincident",
            "id": INCIDENT_ID,
            "resolve": true,
            "data": {"lang": "en"}
        }),
    );
    let worknote = &resolved["result"]["worknotes"][0];
    assert_eq!(worknote["text"], "called vendor");
    assert_eq!(worknote["resolved_lang"], "en");
}

#[test]
fn test_resolve_entity_reference() {
    let engine = engine();
    bootstrap(&engine);
    create_worknote(&engine);
    create_incident(
        &engine,
        MANAGER,
        json!({
            "uuid": INCIDENT_ID,
            "description": "x",
            "related": format!("MockWorknote:{WORKNOTE_ID}")
        }),
    );

    let resolved = get_resolved(&engine, "mockincident", INCIDENT_ID);
    assert_eq!(resolved["related"]["text"], "called vendor");
}

#[test]
fn test_query_resolves_each_asset() {
    let engine = engine();
    bootstrap(&engine);
    create_worknote(&engine);
    for _ in 0..2 {
        create_incident(
            &engine,
            MANAGER,
            json!({"description": "x", "worknotes": [WORKNOTE_ID]}),
        );
    }

    let listed = ok(
        &engine,
        MANAGER,
        json!({"method": "assetQuery", "name": "mockincident", "resolve": true}),
    );
    let result = listed["result"].as_array().unwrap();
    assert_eq!(result.len(), 2);
    for incident in result {
        assert_eq!(incident["worknotes"][0]["text"], "called vendor");
    }
}

#[test]
fn test_field_blacklist_keeps_reference_id() {
    let engine = engine();
    bootstrap(&engine);
    create_worknote(&engine);
    create(
        &engine,
        "mockreffieldblacklist",
        INCIDENT_ID,
        json!({"ref": WORKNOTE_ID, "other": WORKNOTE_ID}),
    );

    let resolved = get_resolved(&engine, "mockreffieldblacklist", INCIDENT_ID);
    assert_eq!(resolved["ref"], WORKNOTE_ID);
    assert_eq!(resolved["other"]["text"], "called vendor");

    let err = call(
        &engine,
        MANAGER,
        json!({"method": "assetCreate", "name": "mockreffieldblacklist", "data": {"ref": MISSING_ID}}),
    )
    .unwrap_err();
    assert_matches!(err.root(), CoreError::BrokenReferences(_));
}

#[test]
fn test_field_blacklist_skips_deleted_target() {
    let engine = engine();
    bootstrap(&engine);
    create_worknote(&engine);
    create(&engine, "mockreffieldblacklist", INCIDENT_ID, json!({"ref": WORKNOTE_ID}));
    ok(
        &engine,
        MANAGER,
        json!({"method": "assetDelete", "name": "mockworknote", "id": WORKNOTE_ID}),
    );

    let resolved = get_resolved(&engine, "mockreffieldblacklist", INCIDENT_ID);
    assert_eq!(resolved["ref"], WORKNOTE_ID);
}

#[test]
fn test_field_blacklist_on_object_prunes_subtree() {
    let engine = Engine::new(
        MemoryLedger::new(),
        builder(settings())
            .field_blacklist("mockreffieldblacklist", "nested")
            .build(),
    );
    bootstrap(&engine);
    create_worknote(&engine);
    create(
        &engine,
        "mockreffieldblacklist",
        INCIDENT_ID,
        json!({"other": WORKNOTE_ID, "nested": {"inner": WORKNOTE_ID}}),
    );
    ok(
        &engine,
        MANAGER,
        json!({"method": "assetDelete", "name": "mockworknote", "id": WORKNOTE_ID}),
    );

    // `other` is still checked and now broken.
    let err = call(
        &engine,
        MANAGER,
        json!({"method": "assetGet", "name": "mockreffieldblacklist", "id": INCIDENT_ID, "resolve": true}),
    )
    .unwrap_err();
    assert_matches!(err.root(), CoreError::BrokenReferences(refs) if refs.len() == 1);

    create_worknote(&engine);
    let resolved = get_resolved(&engine, "mockreffieldblacklist", INCIDENT_ID);
    assert_eq!(resolved["other"]["text"], "called vendor");
    assert_eq!(resolved["nested"]["inner"], WORKNOTE_ID);
}

// ---------------------------------------------------------------------------
// Test: recursion follows the whitelist only
// ---------------------------------------------------------------------------

#[test]
fn test_resolution_is_one_level_by_default() {
    let engine = engine();
    bootstrap(&engine);
    create_levels(&engine);

    let resolved = get_resolved(&engine, "mocklevel1", LEVEL1_ID);
    assert_eq!(resolved["level2"]["uuid"], LEVEL2_ID);
    assert_eq!(resolved["level2"]["level3"], LEVEL3_ID);
}

#[test]
fn test_whitelisted_field_resolves_recursively() {
    let engine = Engine::new(
        MemoryLedger::new(),
        builder(EngineSettings {
            recursive_resolve_whitelist: vec!["mocklevel1.level2".into()],
            ..settings()
        })
        .build(),
    );
    bootstrap(&engine);
    create_levels(&engine);

    let resolved = get_resolved(&engine, "mocklevel1", LEVEL1_ID);
    assert_eq!(resolved["level2"]["level3"]["name"], "leaf");
}
