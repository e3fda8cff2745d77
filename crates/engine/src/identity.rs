//! Identity self-service and superuser bootstrap.
//!
//! Callers register themselves with [`identity_add_me`]. The first call made
//! by the initial manager named at `init` also creates the superuser role
//! and grants it. When a previous fingerprint function is configured, an
//! identity registered under the old fingerprint is migrated to the current
//! one instead of creating a fresh identity.

use ledgerdoc_core::asset::{AssetExt, Object};
use ledgerdoc_core::error::{CoreError, ResultExt};
use ledgerdoc_core::keys::{
    FINGERPRINT_KEY, IDENTITY_ASSET, INIT_MANAGER_KEY, INIT_MANAGER_STATE_KEY, IS_ENABLED_KEY,
    NAME_KEY, ROLES_KEY, ROLE_ASSET, SUPERUSER_ROLE_ID, SUPERUSER_ROLE_NAME,
};
use ledgerdoc_core::policy::ANY_VERSION;
use ledgerdoc_core::stage::Stage;
use serde_json::{json, Value};

use crate::context::TxContext;

/// Result of [`identity_add_me`].
#[derive(Debug, Clone, PartialEq)]
pub enum AddMeOutcome {
    /// The caller was already registered.
    Existing(Object),
    Created(Object),
    /// Copied from the identity under the previous fingerprint.
    Migrated(Object),
}

impl AddMeOutcome {
    pub fn identity(&self) -> &Object {
        match self {
            Self::Existing(identity) | Self::Created(identity) | Self::Migrated(identity) => identity,
        }
    }

    pub fn into_response(self) -> Value {
        match self {
            Self::Migrated(identity) => json!({"migrated": true, "result": identity}),
            Self::Existing(identity) | Self::Created(identity) => json!({"result": identity}),
        }
    }
}

/// Result of [`identity_me`].
#[derive(Debug, Clone, PartialEq)]
pub enum MeOutcome {
    Identity(Object),
    /// Not registered yet, but an identity under the previous fingerprint
    /// can be migrated by calling `identity_add_me`.
    CanMigrate { fingerprint: String },
}

impl MeOutcome {
    pub fn into_response(self) -> Value {
        match self {
            Self::Identity(identity) => json!({"result": identity}),
            Self::CanMigrate { fingerprint } => {
                json!({"fingerprint": fingerprint, "can_migrate": true})
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Superuser bootstrap
// ---------------------------------------------------------------------------

/// Create the superuser role unless it exists.
pub fn ensure_superuser_role(ctx: &mut TxContext) -> Result<(), CoreError> {
    let registry = ctx.registry_mut();
    if registry.get_asset(ROLE_ASSET, SUPERUSER_ROLE_ID, false)?.is_some() {
        return Ok(());
    }
    let mut role = registry.make_asset(ROLE_ASSET, SUPERUSER_ROLE_ID, ANY_VERSION)?;
    role.insert(NAME_KEY.into(), json!(SUPERUSER_ROLE_NAME));
    registry.put_asset(&role, true).context("store superuser role")?;
    tracing::info!("superuser role created");
    Ok(())
}

/// Add the superuser role to `identity`. Returns whether it changed.
pub fn ensure_superuser_grant(identity: &mut Object) -> Result<bool, CoreError> {
    let mut roles = identity.string_list(ROLES_KEY)?;
    if roles.iter().any(|r| r == SUPERUSER_ROLE_ID) {
        return Ok(false);
    }
    roles.push(SUPERUSER_ROLE_ID.to_string());
    identity.insert(ROLES_KEY.into(), json!(roles));
    Ok(true)
}

/// Consume the pending initial manager if it is the caller.
///
/// Returns true when the caller must be granted superuser.
fn take_init_manager(ctx: &mut TxContext) -> Result<bool, CoreError> {
    let Some(pending) = ctx.registry().get_json(INIT_MANAGER_STATE_KEY)? else {
        return Ok(false);
    };
    let manager = pending
        .get(INIT_MANAGER_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::Internal(format!("{INIT_MANAGER_STATE_KEY} record is malformed")))?;
    if manager != ctx.fingerprint() {
        return Ok(false);
    }

    ensure_superuser_role(ctx)?;
    ctx.registry_mut().delete_key(INIT_MANAGER_STATE_KEY)?;
    tracing::info!(fingerprint = %ctx.fingerprint(), "initial manager bootstrapped");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Migration between fingerprint functions
// ---------------------------------------------------------------------------

fn old_identity(ctx: &mut TxContext) -> Result<Option<Object>, CoreError> {
    match ctx.previous_fingerprint() {
        Some(old) => ctx.registry_mut().get_asset(IDENTITY_ASSET, &old, false),
        None => Ok(None),
    }
}

/// Copy `old` under the caller's current fingerprint and disable it.
fn migrate_old_identity(ctx: &mut TxContext, mut old: Object) -> Result<Object, CoreError> {
    let mut migrated = old.clone();
    migrated.insert(FINGERPRINT_KEY.into(), json!(ctx.fingerprint()));
    ctx.registry_mut()
        .put_asset(&migrated, true)
        .context("store migrated identity")?;

    old.insert(IS_ENABLED_KEY.into(), json!(false));
    ctx.registry_mut()
        .put_asset(&old, false)
        .context("disable previous identity")?;
    tracing::info!(fingerprint = %ctx.fingerprint(), "identity migrated from previous fingerprint");
    Ok(migrated)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Register the caller.
///
/// `input` is passed as `pre` to the identity's `BeforeCreate` chain.
pub fn identity_add_me(ctx: &mut TxContext, input: Object) -> Result<AddMeOutcome, CoreError> {
    let fingerprint = ctx.fingerprint().to_string();
    let existing = ctx
        .registry_mut()
        .get_asset(IDENTITY_ASSET, &fingerprint, false)?;
    let grant_superuser = take_init_manager(ctx)?;

    if let Some(mut identity) = existing {
        if grant_superuser && ensure_superuser_grant(&mut identity)? {
            ctx.registry_mut()
                .put_asset(&identity, false)
                .context("grant superuser")?;
        }
        return Ok(AddMeOutcome::Existing(identity));
    }

    if let Some(old) = old_identity(ctx)? {
        return Ok(AddMeOutcome::Migrated(migrate_old_identity(ctx, old)?));
    }

    let mut identity = ctx.make_asset(IDENTITY_ASSET, &fingerprint, ANY_VERSION)?;
    identity.insert(IS_ENABLED_KEY.into(), json!(true));
    if grant_superuser {
        identity.insert(ROLES_KEY.into(), json!([SUPERUSER_ROLE_ID]));
    }

    let identity = ctx.run_stage(Stage::BeforeCreate, Some(&input), identity)?;
    ctx.put_asset(&identity, true, true).context("store identity")?;
    tracing::info!(fingerprint = %fingerprint, "identity registered");
    Ok(AddMeOutcome::Created(identity))
}

/// The caller's own identity.
pub fn identity_me(ctx: &mut TxContext, resolve: bool) -> Result<MeOutcome, CoreError> {
    let fingerprint = ctx.fingerprint().to_string();
    let Some(identity) = ctx.get_asset(IDENTITY_ASSET, &fingerprint, resolve, false)? else {
        if let Some(old) = old_identity(ctx)? {
            return Ok(MeOutcome::CanMigrate {
                fingerprint: old.str_field(FINGERPRINT_KEY)?.to_string(),
            });
        }
        return Err(CoreError::BadRequest(format!(
            "cannot get identity for fingerprint: {fingerprint}. Did you call identityAddMe?"
        )));
    };

    Ok(MeOutcome::Identity(ctx.run_stage(Stage::AfterGet, None, identity)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_grant_is_idempotent() {
        let mut identity = Object::new();
        assert!(ensure_superuser_grant(&mut identity).unwrap());
        assert_eq!(identity[ROLES_KEY], json!([SUPERUSER_ROLE_ID]));
        assert!(!ensure_superuser_grant(&mut identity).unwrap());

        let mut other = json!({"roles": ["0f9a3c1e-1111-4222-8333-444455556666"]})
            .as_object()
            .cloned()
            .unwrap();
        assert!(ensure_superuser_grant(&mut other).unwrap());
        assert_eq!(other.string_list(ROLES_KEY).unwrap().len(), 2);
    }

    #[test]
    fn migrated_response_is_flagged() {
        let identity = Object::new();
        let response = AddMeOutcome::Migrated(identity.clone()).into_response();
        assert_eq!(response["migrated"], true);
        assert_eq!(
            AddMeOutcome::Created(identity).into_response(),
            json!({"result": {}})
        );
    }
}
