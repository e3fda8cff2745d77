//! Integration tests for identity self-service, direct identity creation and
//! migration between fingerprint functions.

mod common;

use common::{add_me, bootstrap, builder, call, engine, fingerprint, obj, ok, request, settings};
use common::{ALICE, BOB, MANAGER};
use ledgerdoc_core::error::Status;
use ledgerdoc_core::keys::SUPERUSER_ROLE_ID;
use ledgerdoc_engine::{Engine, EngineSettings, IdFunc};
use ledgerdoc_store::MemoryLedger;
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: identityAddMe registers the caller once
// ---------------------------------------------------------------------------

#[test]
fn test_add_me_registers_caller() {
    let engine = engine();
    bootstrap(&engine);

    let identity = add_me(&engine, ALICE);
    assert_eq!(identity["fingerprint"], fingerprint(ALICE));
    assert_eq!(identity["docType"], "IDENTITY");
    assert_eq!(identity["is_enabled"], true);
    assert!(identity.get("roles").is_none());

    let again = ok(&engine, ALICE, json!({"method": "identityAddMe"}));
    assert_eq!(again, json!({"result": identity}));
}

#[test]
fn test_manager_bootstrap_creates_superuser_role() {
    let engine = engine();
    bootstrap(&engine);

    let role = ok(
        &engine,
        MANAGER,
        json!({"method": "roleGet", "id": SUPERUSER_ROLE_ID}),
    );
    assert_eq!(role["result"]["name"], "Superuser");

    // The pending manager record is consumed by the first call.
    add_me(&engine, ALICE);
    let alice = ok(&engine, ALICE, json!({"method": "identityMe"}));
    assert!(alice["result"].get("roles").is_none());
}

// ---------------------------------------------------------------------------
// Test: identityMe
// ---------------------------------------------------------------------------

#[test]
fn test_identity_me_requires_registration() {
    let engine = engine();
    bootstrap(&engine);

    let err = call(&engine, BOB, json!({"method": "identityMe"})).unwrap_err();
    assert_eq!(err.status(), Status::BadRequest);
    assert_eq!(
        err.to_string(),
        format!(
            "cannot get identity for fingerprint: {}. Did you call identityAddMe?",
            fingerprint(BOB)
        )
    );
}

#[test]
fn test_identity_me_resolves_roles() {
    let engine = engine();
    bootstrap(&engine);

    let plain = ok(&engine, MANAGER, json!({"method": "identityMe"}));
    assert_eq!(plain["result"]["roles"], json!([SUPERUSER_ROLE_ID]));

    let resolved = ok(&engine, MANAGER, json!({"method": "identityMe", "resolve": true}));
    assert_eq!(resolved["result"]["roles"][0]["name"], "Superuser");
}

// ---------------------------------------------------------------------------
// Test: identityCreateDirect
// ---------------------------------------------------------------------------

#[test]
fn test_identity_create_direct() {
    let engine = engine();
    bootstrap(&engine);

    let created = ok(
        &engine,
        MANAGER,
        json!({
            "method": "identityCreateDirect",
            "fingerprint": "abcdef0123",
            "data": {"is_enabled": true, "org_name": "acme"}
        }),
    );
    assert_eq!(created["result"]["fingerprint"], "abcdef0123");
    assert_eq!(created["result"]["org_name"], "acme");

    add_me(&engine, ALICE);
    let err = call(
        &engine,
        ALICE,
        json!({"method": "identityCreateDirect", "fingerprint": "abcdef4567", "data": {"is_enabled": true}}),
    )
    .unwrap_err();
    assert_eq!(err.status(), Status::Forbidden);
    assert!(err.to_string().ends_with("act: create_direct"));
}

#[test]
fn test_identity_create_direct_checks_fingerprint() {
    let engine = engine();
    bootstrap(&engine);

    let err = call(
        &engine,
        MANAGER,
        json!({
            "method": "identityCreateDirect",
            "fingerprint": "bb",
            "data": {"fingerprint": "aa", "is_enabled": true}
        }),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "fingerprint from CC param: bb does not match fingerprint in data: aa"
    );

    let err = call(
        &engine,
        MANAGER,
        json!({"method": "identityCreateDirect", "data": {"is_enabled": true}}),
    )
    .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("identity fingerprint cannot be autogenerated"));
}

#[test]
fn test_identity_direct_create_requires_version_one() {
    let engine = engine();
    bootstrap(&engine);

    for version in [json!(-1), json!(2)] {
        let err = call(
            &engine,
            MANAGER,
            json!({
                "method": "assetCreateDirect",
                "name": "identity",
                "id": "abcdef0123",
                "version": version,
                "data": {"is_enabled": true}
            }),
        )
        .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(err.to_string(), "identity must be created with version 1");
    }

    let created = ok(
        &engine,
        MANAGER,
        json!({
            "method": "assetCreateDirect",
            "name": "identity",
            "id": "abcdef0123",
            "version": 1,
            "data": {"is_enabled": true}
        }),
    );
    assert_eq!(created["result"]["fingerprint"], "abcdef0123");
}

// ---------------------------------------------------------------------------
// Test: identities move to a new fingerprint function
// ---------------------------------------------------------------------------

#[test]
fn test_identity_migrates_from_previous_fingerprint() {
    let ledger = MemoryLedger::new();
    let old_fingerprint = IdFunc::Sha256.fingerprint(MANAGER);

    let before = Engine::new(
        ledger.clone(),
        builder(EngineSettings {
            id_func: IdFunc::Sha256,
            ..settings()
        })
        .build(),
    );
    before
        .init(
            &request(MANAGER),
            obj(json!({"init_manager": old_fingerprint, "registries": common::registries()})),
        )
        .unwrap();
    ok(&before, MANAGER, json!({"method": "identityAddMe"}));

    let after = Engine::new(
        ledger,
        builder(EngineSettings {
            previous_id_func: Some(IdFunc::Sha256),
            ..settings()
        })
        .build(),
    );

    let pending = ok(&after, MANAGER, json!({"method": "identityMe"}));
    assert_eq!(pending, json!({"fingerprint": old_fingerprint, "can_migrate": true}));

    let migrated = ok(&after, MANAGER, json!({"method": "identityAddMe"}));
    assert_eq!(migrated["migrated"], true);
    assert_eq!(migrated["result"]["fingerprint"], fingerprint(MANAGER));
    assert_eq!(migrated["result"]["roles"], json!([SUPERUSER_ROLE_ID]));

    let old = ok(
        &after,
        MANAGER,
        json!({"method": "identityGet", "fingerprint": old_fingerprint}),
    );
    assert_eq!(old["result"]["is_enabled"], false);

    let me = ok(&after, MANAGER, json!({"method": "identityMe"}));
    assert_eq!(me["result"]["fingerprint"], fingerprint(MANAGER));
}
