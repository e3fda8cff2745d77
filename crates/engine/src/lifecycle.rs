//! Asset lifecycle: create, get, update, query, delete, migrate and history.
//!
//! Every verb runs in [`Mode::Standard`] or [`Mode::Direct`]. Direct mode is
//! a privileged bypass guarded by its own `*_direct` permission; it runs no
//! business logic and skips reference validation. Stages run in a fixed
//! order around the store calls and the first failure aborts the request.

use ledgerdoc_core::asset::{id_key, AssetExt, Object};
use ledgerdoc_core::error::{CoreError, ResultExt};
use ledgerdoc_core::keys::{
    action, FINGERPRINT_KEY, IDENTITY_ASSET, IS_ENABLED_KEY, IS_SYSTEM_KEY, ROLES_KEY, ROLE_ASSET,
    SUPERUSER_ROLE_ID, VERSION_KEY,
};
use ledgerdoc_core::patch::merge_patch;
use ledgerdoc_core::policy::FuncKey;
use ledgerdoc_core::query::Query;
use ledgerdoc_core::stage::Stage;
use ledgerdoc_store::AssetHistoryItem;
use serde::Serialize;
use serde_json::{json, Value};

use crate::context::TxContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Standard,
    Direct,
}

impl Mode {
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    pub result: Vec<Object>,
    pub bookmark: String,
}

fn reject_service_keys(patch: &Object) -> Result<(), CoreError> {
    if patch.has_service_keys() {
        return Err(CoreError::BadRequest("patch contains service key(s)".into()));
    }
    Ok(())
}

fn is_system(asset: &Object) -> bool {
    asset.get(IS_SYSTEM_KEY).and_then(Value::as_bool).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Create asset `name` from `patch`.
///
/// The id comes from the patch body, from `id`, or is generated. Returns the
/// stored asset after `AfterCreate` rendering.
pub fn create(
    ctx: &mut TxContext,
    name: &str,
    mut patch: Object,
    id: Option<&str>,
    version: i64,
    mode: Mode,
) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    let id_key = id_key(&name);
    let is_identity = name == IDENTITY_ASSET;

    let body_id = match patch.remove(id_key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            return Err(CoreError::BadRequest(format!(
                "{id_key} in data must be a string, got: {other}"
            )))
        }
    };
    let param_id = id.filter(|s| !s.is_empty()).map(str::to_string);
    if let (Some(param), Some(body)) = (&param_id, &body_id) {
        if param != body {
            let label = if is_identity { FINGERPRINT_KEY } else { "id" };
            return Err(CoreError::BadRequest(format!(
                "{label} from CC param: {param} does not match {label} in data: {body}"
            )));
        }
    }
    let given_id = param_id.or(body_id);

    let id = if is_identity {
        if !mode.is_direct() {
            return Err(CoreError::BadRequest(
                "identity can only be created with identityCreateDirect method".into(),
            ));
        }
        if version != 1 {
            return Err(CoreError::BadRequest("identity must be created with version 1".into()));
        }
        given_id.ok_or_else(|| {
            CoreError::BadRequest(
                "identity fingerprint cannot be autogenerated, you must send one in data or in CC param"
                    .into(),
            )
        })?
    } else {
        match given_id {
            Some(id) => id,
            None => ctx.next_uuid(),
        }
    };

    reject_service_keys(&patch)?;

    let asset = ctx.make_asset(&name, &id, version).context("make asset")?;

    let required = if mode.is_direct() {
        Some(action::CREATE_DIRECT)
    } else if is_identity {
        Some(action::CREATE)
    } else if name == ROLE_ASSET {
        Some(if is_system(&patch) { action::CREATE_SYSTEM } else { action::CREATE })
    } else {
        None
    };
    if let Some(required) = required {
        ctx.enforce_asset(&asset, required)?;
    }
    ctx.mark_existing(&name, &id);

    let mut asset = if mode.is_direct() {
        asset
    } else {
        ctx.run_stage_custom(Stage::PatchCreate, &asset, Some(&asset), patch.clone())?;
        ctx.run_stage(Stage::FirstCreate, None, asset)?
    };

    merge_patch(&mut asset, &patch);

    if !mode.is_direct() {
        asset = ctx.run_stage(Stage::BeforeCreate, None, asset)?;
    }

    ctx.put_asset(&asset, true, !mode.is_direct())
        .context("put asset")?;
    tracing::debug!(name = %name, id = %id, direct = mode.is_direct(), "asset created");

    if mode.is_direct() {
        return Ok(asset);
    }
    ctx.run_stage(Stage::AfterCreate, None, asset)
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

pub fn get(ctx: &mut TxContext, name: &str, id: &str, resolve: bool, mode: Mode) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    let asset = ctx.require_asset(&name, id, resolve)?;

    if mode.is_direct() {
        ctx.enforce_asset(&asset, action::READ_DIRECT)?;
        return Ok(asset);
    }

    let own_identity = name == IDENTITY_ASSET && id == ctx.fingerprint();
    if (name == IDENTITY_ASSET || name == ROLE_ASSET) && !own_identity {
        ctx.enforce_asset(&asset, action::READ)?;
    }

    let data = ctx.data().cloned().unwrap_or_default();
    ctx.run_stage(Stage::AfterGet, Some(&data), asset)
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

pub fn update(
    ctx: &mut TxContext,
    name: &str,
    id: &str,
    patch: Object,
    mode: Mode,
) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    let mut pre = ctx.require_asset(&name, id, false)?;

    let required = if mode.is_direct() {
        Some(action::UPDATE_DIRECT)
    } else if name == IDENTITY_ASSET {
        Some(action::UPDATE)
    } else if name == ROLE_ASSET {
        Some(if is_system(&pre) { action::UPDATE_SYSTEM } else { action::UPDATE })
    } else {
        None
    };
    if let Some(required) = required {
        ctx.enforce_asset(&pre, required)?;
    }

    if patch.is_empty() {
        return Err(CoreError::BadRequest("patch is empty".into()));
    }
    reject_service_keys(&patch)?;

    if !mode.is_direct() {
        ctx.run_stage_custom(Stage::PatchUpdate, &pre, Some(&pre), patch.clone())?;
        pre = ctx.run_stage(Stage::FirstUpdate, None, pre)?;
    }

    let mut post = pre.clone();
    merge_patch(&mut post, &patch);

    if !mode.is_direct() {
        post = ctx.run_stage(Stage::BeforeUpdate, Some(&pre), post)?;
    }

    if name == IDENTITY_ASSET {
        identity_extra_validate(ctx, &pre, &post)?;
    }

    ctx.put_asset(&post, false, !mode.is_direct())
        .context("put asset")?;
    tracing::debug!(name = %name, id, direct = mode.is_direct(), "asset updated");

    if mode.is_direct() {
        return Ok(post);
    }
    ctx.run_stage(Stage::AfterUpdate, Some(&pre), post)
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

pub fn query(
    ctx: &mut TxContext,
    name: &str,
    query: Object,
    resolve: bool,
    mode: Mode,
) -> Result<QueryOutput, CoreError> {
    let name = name.to_lowercase();
    Query::from_object(query.clone())?;

    let query = if mode.is_direct() {
        ctx.enforce_custom(&format!("/{name}"), action::QUERY_DIRECT, None)?;
        query
    } else {
        ctx.run_stage_for_key(&FuncKey::any_version(&name), Stage::BeforeQuery, None, query)?
    };
    let query = Query::from_object(query)?;

    let (mut assets, bookmark) = ctx.query_assets(&name, query, resolve)?;
    if mode.is_direct() {
        return Ok(QueryOutput { result: assets, bookmark });
    }

    if name == IDENTITY_ASSET || name == ROLE_ASSET {
        assets = ctx.filter_assets(assets, action::READ)?;
    }
    let mut result = Vec::with_capacity(assets.len());
    for asset in assets {
        result.push(ctx.run_stage(Stage::AfterQuery, None, asset)?);
    }
    Ok(QueryOutput { result, bookmark })
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

pub fn delete(ctx: &mut TxContext, name: &str, id: &str, mode: Mode) -> Result<(), CoreError> {
    let name = name.to_lowercase();
    let asset = ctx.require_asset(&name, id, false)?;

    if mode.is_direct() {
        ctx.enforce_asset(&asset, action::DELETE_DIRECT)?;
    } else {
        ctx.run_stage(Stage::BeforeDelete, None, asset)?;
    }

    ctx.delete_asset(&name, id)?;
    tracing::debug!(name = %name, id, direct = mode.is_direct(), "asset deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Migrate
// ---------------------------------------------------------------------------

/// Move an asset to schema `version` (`-1` = latest), applying `patch`.
///
/// No business logic runs; schema and references are validated.
pub fn migrate(
    ctx: &mut TxContext,
    name: &str,
    id: &str,
    patch: Object,
    version: i64,
) -> Result<Object, CoreError> {
    let name = name.to_lowercase();
    let pre = ctx.require_asset(&name, id, false)?;
    ctx.enforce_asset(&pre, action::MIGRATE)?;

    let (_, target) = ctx.registry_mut().get_item(&name, version)?;
    if target == pre.version()? {
        return Err(CoreError::BadRequest(
            "unable to migrate to the same version of asset".into(),
        ));
    }
    reject_service_keys(&patch)?;

    let mut post = pre;
    post.insert(VERSION_KEY.into(), json!(target));
    merge_patch(&mut post, &patch);

    ctx.put_asset(&post, false, true).context("put asset")?;
    tracing::info!(name = %name, id, version = target, "asset migrated");
    Ok(post)
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Committed versions of an existing asset, guarded by `get_history`.
pub fn history(ctx: &mut TxContext, name: &str, id: &str) -> Result<Vec<AssetHistoryItem>, CoreError> {
    let name = name.to_lowercase();
    let asset = ctx.require_asset(&name, id, false)?;
    ctx.enforce_asset(&asset, action::GET_HISTORY)?;
    ctx.asset_history(&name, id)
}

// ---------------------------------------------------------------------------
// Identity rules
// ---------------------------------------------------------------------------

/// Superuser-safety rules applied to every identity update.
pub fn identity_extra_validate(ctx: &mut TxContext, pre: &Object, post: &Object) -> Result<(), CoreError> {
    let is_enabled = post.get(IS_ENABLED_KEY).and_then(Value::as_bool).unwrap_or(false);
    let own = post.get(FINGERPRINT_KEY).and_then(Value::as_str) == Some(ctx.fingerprint());
    if own && !is_enabled {
        return Err(CoreError::BadRequest(
            "unable to set is_enabled to false on own identity".into(),
        ));
    }

    let had_su = pre.string_list(ROLES_KEY)?.iter().any(|r| r == SUPERUSER_ROLE_ID);
    let has_su = post.string_list(ROLES_KEY)?.iter().any(|r| r == SUPERUSER_ROLE_ID);
    let granting = is_enabled && !had_su && has_su;
    let revoking = (is_enabled && had_su && !has_su) || (!is_enabled && has_su);
    if !granting && !revoking {
        return Ok(());
    }

    if !ctx.is_superuser()? {
        return Err(CoreError::Forbidden(
            "to manage SuperUser role, you must have it granted".into(),
        ));
    }
    if revoking && superuser_count(ctx)? == 1 {
        return Err(CoreError::BadRequest("unable to remove last superuser role".into()));
    }
    Ok(())
}

/// Query selecting identities holding the superuser role.
pub fn superuser_query() -> Query {
    let selector = json!({
        ROLES_KEY: {"$elemMatch": {"$eq": SUPERUSER_ROLE_ID}}
    });
    Query {
        selector: selector.as_object().cloned().unwrap_or_default(),
        ..Default::default()
    }
}

/// Number of identities holding superuser, counted up to two.
pub fn superuser_count(ctx: &mut TxContext) -> Result<usize, CoreError> {
    let (found, _) = ctx
        .registry_mut()
        .query_assets(IDENTITY_ASSET, superuser_query(), 2)?;
    Ok(found.len())
}
