//! Function invocation and the built-in functions.

use std::collections::{BTreeMap, BTreeSet};

use ledgerdoc_core::access::AccessEnforcer;
use ledgerdoc_core::asset::{AssetExt, Object};
use ledgerdoc_core::error::{CoreError, ResultExt};
use ledgerdoc_core::function::FunctionExecutor;
use ledgerdoc_core::keys::{
    action, ACTION_KEY, FINGERPRINT_KEY, FN_IDENTITY_ACCESS, FN_MY_ACCESS, FN_UPSERT_REGISTRIES,
    FN_UPSERT_SINGLETONS, FUNCTION_INVOKE_OBJECT_PREFIX, FUNCTION_QUERY_OBJECT_PREFIX,
    GRANTS_KEY, IDENTITY_ASSET, OBJECT_KEY, ROLES_KEY, SUPERUSER_ROLE_ID, UUID_KEY,
};
use serde_json::{json, Value};

use crate::context::TxContext;
use crate::registry::{upsert_registries, upsert_singletons};

/// Input key of `identityAccess`.
const IDENTITY_INPUT_KEY: &str = "identity";

/// Run function `name` in an invoke transaction.
pub fn function_invoke(ctx: &mut TxContext, name: &str, input: &Object) -> Result<Object, CoreError> {
    ctx.enforce_custom(
        &format!("{FUNCTION_INVOKE_OBJECT_PREFIX}{name}"),
        action::EXECUTE,
        None,
    )?;
    execute(ctx, name, input)
}

/// Run function `name` in a read-only transaction.
///
/// `myAccess` needs no grant.
pub fn function_query(ctx: &mut TxContext, name: &str, input: &Object) -> Result<Object, CoreError> {
    let object = format!("{FUNCTION_QUERY_OBJECT_PREFIX}{name}");
    if !object.eq_ignore_ascii_case(&format!("{FUNCTION_QUERY_OBJECT_PREFIX}{FN_MY_ACCESS}")) {
        ctx.enforce_custom(&object, action::EXECUTE, None)?;
    }
    execute(ctx, name, input)
}

fn execute(ctx: &mut TxContext, name: &str, input: &Object) -> Result<Object, CoreError> {
    let config = ctx.config();
    tracing::debug!(function = name, "executing function");
    config
        .functions
        .execute(ctx, name, input)
        .with_context(|| format!("function {name} failed"))
}

/// Register the functions every engine provides.
pub fn register_builtins(functions: &mut FunctionExecutor<TxContext>) {
    functions.register(FN_MY_ACCESS, my_access);
    functions.register(FN_IDENTITY_ACCESS, identity_access);
    functions.register(FN_UPSERT_REGISTRIES, |ctx, input, _| {
        upsert_registries(ctx, input)?;
        Ok(ok_result())
    });
    functions.register(FN_UPSERT_SINGLETONS, |ctx, input, _| {
        upsert_singletons(ctx, input)?;
        Ok(ok_result())
    });
}

fn ok_result() -> Object {
    let mut output = Object::new();
    output.insert("result".into(), json!({"ok": true}));
    output
}

// ---------------------------------------------------------------------------
// Access overview
// ---------------------------------------------------------------------------

fn my_access(ctx: &mut TxContext, _input: &Object, _output: Object) -> Result<Object, CoreError> {
    let identity = ctx.this_identity_resolved()?;
    access_overview(ctx, &identity)
}

fn identity_access(ctx: &mut TxContext, input: &Object, _output: Object) -> Result<Object, CoreError> {
    let fingerprint = input
        .get(IDENTITY_INPUT_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::BadRequest("identity' key is missing".into()))?;
    let identity = ctx
        .registry_mut()
        .get_asset(IDENTITY_ASSET, fingerprint, false)?
        .ok_or_else(|| {
            CoreError::BadRequest(format!("cannot get identity for fingerprint: {fingerprint}"))
        })?;
    let identity = ctx.inline_roles(identity)?;
    access_overview(ctx, &identity)
}

fn resolved_roles(identity: &Object) -> Vec<&Object> {
    identity
        .get(ROLES_KEY)
        .and_then(Value::as_array)
        .map(|roles| roles.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn is_superuser_identity(identity: &Object) -> bool {
    resolved_roles(identity)
        .iter()
        .any(|role| role.get(UUID_KEY).and_then(Value::as_str) == Some(SUPERUSER_ROLE_ID))
}

/// Grants outside create/read/update/delete/execute: action -> objects.
fn custom_grants(identity: &Object) -> BTreeMap<String, BTreeSet<String>> {
    let mut grants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for role in resolved_roles(identity) {
        let Some(list) = role.get(GRANTS_KEY).and_then(Value::as_array) else {
            continue;
        };
        for grant in list.iter().filter_map(Value::as_object) {
            let (Some(action), Some(object)) = (
                grant.get(ACTION_KEY).and_then(Value::as_str),
                grant.get(OBJECT_KEY).and_then(Value::as_str),
            ) else {
                continue;
            };
            if action::STANDARD.contains(&action) {
                continue;
            }
            grants
                .entry(action.to_string())
                .or_default()
                .insert(object.to_string());
        }
    }
    grants
}

/// Functions and assets `identity` can use, plus its custom grants.
///
/// `identity` must have its roles inlined.
fn access_overview(ctx: &mut TxContext, identity: &Object) -> Result<Object, CoreError> {
    let subject = identity.str_field(FINGERPRINT_KEY)?.to_string();
    let superuser = is_superuser_identity(identity);

    let mut enforcer = AccessEnforcer::new();
    if !superuser {
        enforcer.load_roles(identity)?;
    }
    let mut granted = |object: &str, action: &str| -> Result<bool, CoreError> {
        if superuser {
            return Ok(true);
        }
        Ok(enforcer.enforce_custom(object, &subject, action, None)?.is_granted())
    };

    let config = ctx.config();
    let functions = config.functions.list();
    let assets = ctx.registry().list_items()?;
    let mut output = Object::new();

    for (kind, prefix) in [
        ("query", FUNCTION_QUERY_OBJECT_PREFIX),
        ("invoke", FUNCTION_INVOKE_OBJECT_PREFIX),
    ] {
        let mut names = Vec::new();
        for name in &functions {
            if granted(&format!("{prefix}{name}"), action::EXECUTE)? {
                names.push(name.clone());
            }
        }
        output.insert(format!("functions_{kind}"), json!(names));
    }

    for verb in [action::CREATE, action::READ, action::UPDATE, action::DELETE] {
        let mut names = Vec::new();
        for asset in &assets {
            if granted(&format!("/{asset}/*"), verb)? {
                names.push(asset.clone());
            }
        }
        output.insert(format!("assets_{verb}"), json!(names));
    }

    let mut custom = custom_grants(identity);
    if superuser {
        custom
            .entry("view_sensitive".into())
            .or_default()
            .insert("/user/*".into());
    }
    output.insert("custom_grants".into(), json!(custom));
    Ok(output)
}
