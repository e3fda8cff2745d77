//! Integration tests for function invocation, the access overview
//! functions and transaction rollback around functions.

mod common;

use common::{add_me, bootstrap, builder, call, fingerprint, grant, ok, settings};
use common::{ALICE, MANAGER};
use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::{CoreError, Status};
use ledgerdoc_core::function::FunctionHook;
use ledgerdoc_engine::{Engine, TxContext};
use ledgerdoc_store::MemoryLedger;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_marker(ctx: &mut TxContext, _input: &Object, output: Object) -> Result<Object, CoreError> {
    ctx.registry_mut()
        .upsert_singleton("marker", &json!({"value": {"written": true}}))?;
    Ok(output)
}

fn fail(_ctx: &mut TxContext, _input: &Object, _output: Object) -> Result<Object, CoreError> {
    Err(CoreError::BadRequest("second step failed".into()))
}

fn engine() -> Engine<MemoryLedger> {
    let config = builder(settings())
        .function("echo", |_ctx, input, mut output| {
            output.insert("echo".into(), json!(input));
            Ok(output)
        })
        .function_chain(
            "writeThenFail",
            vec![
                Box::new(write_marker) as FunctionHook<TxContext>,
                Box::new(fail) as FunctionHook<TxContext>,
            ],
        )
        .function_chain("writeOnly", vec![Box::new(write_marker) as FunctionHook<TxContext>])
        .build();
    Engine::new(MemoryLedger::new(), config)
}

fn singleton(engine: &Engine<MemoryLedger>, name: &str) -> Result<serde_json::Value, CoreError> {
    call(engine, MANAGER, json!({"method": "singletonGet", "name": name}))
}

// ---------------------------------------------------------------------------
// Test: access overview
// ---------------------------------------------------------------------------

#[test]
fn test_my_access_for_superuser() {
    let engine = engine();
    bootstrap(&engine);

    let access = ok(&engine, MANAGER, json!({"method": "functionQuery", "name": "myAccess"}));
    let access = &access["result"];
    assert_eq!(
        access["functions_query"],
        json!([
            "echo",
            "identityAccess",
            "myAccess",
            "upsertRegistries",
            "upsertSingletons",
            "writeOnly",
            "writeThenFail"
        ])
    );
    assert!(access["assets_create"]
        .as_array()
        .unwrap()
        .contains(&json!("mockincident")));
    assert_eq!(access["custom_grants"], json!({"view_sensitive": ["/user/*"]}));
}

#[test]
fn test_my_access_for_plain_identity() {
    let engine = engine();
    bootstrap(&engine);
    add_me(&engine, ALICE);
    grant(
        &engine,
        ALICE,
        json!([
            {"object": "/mockincident/*", "action": "read"},
            {"object": "/function/invoke/echo", "action": "execute"},
            {"object": "/user/*", "action": "view_sensitive"}
        ]),
    );

    let access = ok(&engine, ALICE, json!({"method": "functionQuery", "name": "myAccess"}));
    let access = &access["result"];
    assert_eq!(access["functions_invoke"], json!(["echo"]));
    assert_eq!(access["functions_query"], json!([]));
    assert_eq!(access["assets_read"], json!(["mockincident"]));
    assert_eq!(access["assets_create"], json!([]));
    assert_eq!(access["custom_grants"], json!({"view_sensitive": ["/user/*"]}));

    let same = ok(
        &engine,
        MANAGER,
        json!({"method": "functionQuery", "name": "identityAccess", "input": {"identity": fingerprint(ALICE)}}),
    );
    assert_eq!(same["result"], *access);
}

// ---------------------------------------------------------------------------
// Test: custom functions need an execute grant
// ---------------------------------------------------------------------------

#[test]
fn test_custom_function_requires_grant() {
    let engine = engine();
    bootstrap(&engine);
    add_me(&engine, ALICE);

    let payload = json!({"method": "functionInvoke", "name": "echo", "input": {"n": 1}});
    let err = call(&engine, ALICE, payload.clone()).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "permission denied, sub: {}, obj: /function/invoke/echo, act: execute",
            fingerprint(ALICE)
        )
    );

    grant(&engine, ALICE, json!([{"object": "/function/invoke/echo", "action": "execute"}]));
    let echoed = ok(&engine, ALICE, payload);
    assert_eq!(echoed, json!({"result": {"echo": {"n": 1}}}));
}

#[test]
fn test_unknown_function_rejects() {
    let engine = engine();
    bootstrap(&engine);

    let err = call(&engine, MANAGER, json!({"method": "functionInvoke", "name": "nope"})).unwrap_err();
    assert_eq!(err.status(), Status::BadRequest);
    assert!(err
        .to_string()
        .contains("no policy for function 'nope' is defined"));
}

// ---------------------------------------------------------------------------
// Test: only successful invokes commit
// ---------------------------------------------------------------------------

#[test]
fn test_failed_function_chain_rolls_back() {
    let engine = engine();
    bootstrap(&engine);

    let err = call(
        &engine,
        MANAGER,
        json!({"method": "functionInvoke", "name": "writeThenFail"}),
    )
    .unwrap_err();
    assert!(err.to_string().contains("execution of func #1 failed: second step failed"));
    assert_eq!(singleton(&engine, "marker").unwrap_err().status(), Status::NotFound);

    ok(&engine, MANAGER, json!({"method": "functionInvoke", "name": "writeOnly"}));
    let marker = singleton(&engine, "marker").unwrap();
    assert_eq!(marker["result"]["value"], json!({"written": true}));
}

#[test]
fn test_function_query_discards_writes() {
    let engine = engine();
    bootstrap(&engine);

    let input = json!({"singletons": {"flags": {"value": {"on": true}}}});
    let queried = ok(
        &engine,
        MANAGER,
        json!({"method": "functionQuery", "name": "upsertSingletons", "input": input}),
    );
    assert_eq!(queried, json!({"result": {"result": {"ok": true}}}));
    assert!(singleton(&engine, "flags").is_err());

    ok(
        &engine,
        MANAGER,
        json!({"method": "functionInvoke", "name": "upsertSingletons", "input": input}),
    );
    let flags = singleton(&engine, "flags").unwrap();
    assert_eq!(flags["result"]["version"], 1);
    assert_eq!(flags["result"]["value"]["on"], true);
}
