//! Permission-checked registry and singleton operations, and `init`.

use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::{CoreError, ResultExt};
use ledgerdoc_core::keys::{
    action, IDENTITY_ASSET, INIT_MANAGER_KEY, INIT_MANAGER_STATE_KEY, INIT_REGISTRIES_KEY,
    INIT_SINGLETONS_KEY, REGISTRY_OBJECT_PREFIX, SINGLETON_OBJECT_PREFIX,
};
use ledgerdoc_store::schema;
use serde_json::{json, Value};

use crate::context::TxContext;
use crate::lifecycle::superuser_query;

fn decorate(mut record: Value, name: &str, version: i64) -> Result<Object, CoreError> {
    let map = record
        .as_object_mut()
        .ok_or_else(|| CoreError::Internal(format!("stored record of {name} is not an object")))?;
    map.insert("name".into(), json!(name));
    map.insert("version".into(), json!(version));
    Ok(map.clone())
}

// ---------------------------------------------------------------------------
// Registry items
// ---------------------------------------------------------------------------

/// Registry item `name` at `version` (`-1` = latest), with name and version.
pub fn registry_get(ctx: &mut TxContext, name: &str, version: i64) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    ctx.enforce_custom(&format!("{REGISTRY_OBJECT_PREFIX}{name}"), action::READ, None)?;
    let (item, version) = ctx.registry_mut().get_item(&name, version)?;
    decorate(serde_json::to_value(item)?, &name, version)
}

pub fn registry_list(ctx: &mut TxContext) -> Result<Vec<String>, CoreError> {
    ctx.enforce_custom(&format!("{REGISTRY_OBJECT_PREFIX}*"), action::READ, None)?;
    ctx.registry().list_items()
}

pub fn registry_upsert(ctx: &mut TxContext, name: &str, item: &Value) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    ctx.enforce_custom(&format!("{REGISTRY_OBJECT_PREFIX}{name}"), action::UPSERT, None)?;
    let version = ctx.registry_mut().upsert_item(&name, item)?;
    decorate(item.clone(), &name, version)
}

// ---------------------------------------------------------------------------
// Singletons
// ---------------------------------------------------------------------------

pub fn singleton_get(ctx: &mut TxContext, name: &str, version: i64) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    ctx.enforce_custom(&format!("{SINGLETON_OBJECT_PREFIX}{name}"), action::READ, None)?;
    let (singleton, version) = ctx.registry().get_singleton(&name, version)?;
    decorate(singleton, &name, version)
}

pub fn singleton_list(ctx: &mut TxContext) -> Result<Vec<String>, CoreError> {
    ctx.enforce_custom(&format!("{SINGLETON_OBJECT_PREFIX}*"), action::READ, None)?;
    ctx.registry().list_singletons()
}

pub fn singleton_upsert(ctx: &mut TxContext, name: &str, singleton: &Value) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    ctx.enforce_custom(&format!("{SINGLETON_OBJECT_PREFIX}{name}"), action::UPSERT, None)?;
    let version = ctx.registry_mut().upsert_singleton(&name, singleton)?;
    decorate(singleton.clone(), &name, version)
}

// ---------------------------------------------------------------------------
// Bulk upserts and init
// ---------------------------------------------------------------------------

fn section<'a>(input: &'a Object, key: &str) -> Result<Option<&'a Object>, CoreError> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(CoreError::BadRequest(format!("key '{key}' must be an object"))),
    }
}

/// Upsert every item under `registries`, in name order.
pub fn upsert_registries(ctx: &mut TxContext, input: &Object) -> Result<(), CoreError> {
    let Some(registries) = section(input, INIT_REGISTRIES_KEY)? else {
        return Ok(());
    };
    for (name, item) in registries {
        ctx.registry_mut()
            .upsert_item(name, item)
            .with_context(|| format!("upsert registry item: {name}"))?;
    }
    Ok(())
}

/// Upsert every singleton under `singletons`, in name order.
pub fn upsert_singletons(ctx: &mut TxContext, input: &Object) -> Result<(), CoreError> {
    let Some(singletons) = section(input, INIT_SINGLETONS_KEY)? else {
        return Ok(());
    };
    for (name, singleton) in singletons {
        ctx.registry_mut()
            .upsert_singleton(name, singleton)
            .with_context(|| format!("upsert singleton: {name}"))?;
    }
    Ok(())
}

/// Record the initial manager while no superuser exists.
fn bootstrap_superuser(ctx: &mut TxContext, input: &Object) -> Result<(), CoreError> {
    let page_size = ctx.config().page_size;
    let (superusers, _) = ctx
        .registry_mut()
        .query_assets(IDENTITY_ASSET, superuser_query(), page_size)?;

    let manager = input.get(INIT_MANAGER_KEY).and_then(Value::as_str);
    if superusers.is_empty() {
        let manager = manager.ok_or_else(|| {
            CoreError::BadRequest(format!(
                "{INIT_MANAGER_KEY} is mandatory when no superusers are present"
            ))
        })?;
        ctx.registry_mut()
            .put_json(INIT_MANAGER_STATE_KEY, &json!({ INIT_MANAGER_KEY: manager }))?;
        tracing::info!(fingerprint = manager, "initial manager recorded");
    } else if manager.is_some() {
        tracing::warn!(
            "{INIT_MANAGER_KEY} argument to init was ignored, because some super users already exist"
        );
    }
    Ok(())
}

/// Apply bootstrap data: initial manager, registries and singletons.
pub fn init(ctx: &mut TxContext, input: &Object) -> Result<(), CoreError> {
    if !input.is_empty() {
        schema::validate(&schema::init_schema(), &Value::Object(input.clone()), "init input")?;
    }
    bootstrap_superuser(ctx, input).context("bootstrap superuser")?;
    upsert_registries(ctx, input).context("upsert registries")?;
    upsert_singletons(ctx, input).context("upsert singletons")?;
    Ok(())
}
