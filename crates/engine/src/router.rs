//! Operation routing.
//!
//! [`Operation`] is the typed form of an inbound call; [`dispatch`] runs it
//! against a transaction context and renders the JSON response.

use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::keys::{IDENTITY_ASSET, RESULT_KEY, ROLE_ASSET};
use ledgerdoc_core::policy::ANY_VERSION;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::TxContext;
use crate::lifecycle::{self, Mode};
use crate::{functions, identity, registry};

fn latest() -> i64 {
    ANY_VERSION
}

/// A call into the engine, tagged by its method name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Operation {
    AssetCreate {
        name: String,
        data: Object,
        #[serde(default)]
        id: Option<String>,
        #[serde(default = "latest")]
        version: i64,
    },
    AssetCreateDirect {
        name: String,
        data: Object,
        #[serde(default)]
        id: Option<String>,
        #[serde(default = "latest")]
        version: i64,
    },
    AssetGet {
        name: String,
        id: String,
        #[serde(default)]
        resolve: bool,
        #[serde(default)]
        data: Option<Object>,
    },
    AssetGetDirect {
        name: String,
        id: String,
        #[serde(default)]
        resolve: bool,
    },
    AssetUpdate {
        name: String,
        id: String,
        patch: Object,
    },
    AssetUpdateDirect {
        name: String,
        id: String,
        patch: Object,
    },
    AssetQuery {
        name: String,
        #[serde(default)]
        query: Object,
        #[serde(default)]
        resolve: bool,
        #[serde(default)]
        data: Option<Object>,
    },
    AssetQueryDirect {
        name: String,
        #[serde(default)]
        query: Object,
        #[serde(default)]
        resolve: bool,
    },
    AssetDelete {
        name: String,
        id: String,
    },
    AssetDeleteDirect {
        name: String,
        id: String,
    },
    AssetHistory {
        name: String,
        id: String,
    },
    AssetMigrate {
        name: String,
        id: String,
        #[serde(default)]
        patch: Object,
        #[serde(default = "latest")]
        version: i64,
    },
    IdentityAddMe {
        #[serde(default)]
        input: Object,
    },
    IdentityMe {
        #[serde(default)]
        resolve: bool,
    },
    IdentityCreateDirect {
        data: Object,
        #[serde(default)]
        fingerprint: Option<String>,
    },
    IdentityGet {
        fingerprint: String,
        #[serde(default)]
        resolve: bool,
        #[serde(default)]
        data: Option<Object>,
    },
    IdentityUpdate {
        fingerprint: String,
        patch: Object,
    },
    IdentityUpdateDirect {
        fingerprint: String,
        patch: Object,
    },
    IdentityQuery {
        #[serde(default)]
        query: Object,
        #[serde(default)]
        resolve: bool,
    },
    RoleCreate {
        data: Object,
        #[serde(default)]
        id: Option<String>,
    },
    RoleGet {
        id: String,
        #[serde(default)]
        resolve: bool,
    },
    RoleUpdate {
        id: String,
        patch: Object,
    },
    RoleQuery {
        #[serde(default)]
        query: Object,
        #[serde(default)]
        resolve: bool,
    },
    RegistryGet {
        name: String,
        #[serde(default = "latest")]
        version: i64,
    },
    RegistryList,
    RegistryUpsert {
        name: String,
        data: Value,
    },
    SingletonGet {
        name: String,
        #[serde(default = "latest")]
        version: i64,
    },
    SingletonList,
    SingletonUpsert {
        name: String,
        data: Value,
    },
    FunctionInvoke {
        name: String,
        #[serde(default)]
        input: Object,
    },
    FunctionQuery {
        name: String,
        #[serde(default)]
        input: Object,
    },
    Init {
        #[serde(default)]
        input: Object,
    },
}

impl Operation {
    /// Parse an operation from its JSON form.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::BadRequest(format!("invalid operation: {e}")))
    }

    /// True for operations whose writes must never be committed.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::AssetGet { .. }
                | Self::AssetGetDirect { .. }
                | Self::AssetQuery { .. }
                | Self::AssetQueryDirect { .. }
                | Self::AssetHistory { .. }
                | Self::IdentityMe { .. }
                | Self::IdentityGet { .. }
                | Self::IdentityQuery { .. }
                | Self::RoleGet { .. }
                | Self::RoleQuery { .. }
                | Self::RegistryGet { .. }
                | Self::RegistryList
                | Self::SingletonGet { .. }
                | Self::SingletonList
                | Self::FunctionQuery { .. }
        )
    }

    /// Method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Self::AssetCreate { .. } => "assetCreate",
            Self::AssetCreateDirect { .. } => "assetCreateDirect",
            Self::AssetGet { .. } => "assetGet",
            Self::AssetGetDirect { .. } => "assetGetDirect",
            Self::AssetUpdate { .. } => "assetUpdate",
            Self::AssetUpdateDirect { .. } => "assetUpdateDirect",
            Self::AssetQuery { .. } => "assetQuery",
            Self::AssetQueryDirect { .. } => "assetQueryDirect",
            Self::AssetDelete { .. } => "assetDelete",
            Self::AssetDeleteDirect { .. } => "assetDeleteDirect",
            Self::AssetHistory { .. } => "assetHistory",
            Self::AssetMigrate { .. } => "assetMigrate",
            Self::IdentityAddMe { .. } => "identityAddMe",
            Self::IdentityMe { .. } => "identityMe",
            Self::IdentityCreateDirect { .. } => "identityCreateDirect",
            Self::IdentityGet { .. } => "identityGet",
            Self::IdentityUpdate { .. } => "identityUpdate",
            Self::IdentityUpdateDirect { .. } => "identityUpdateDirect",
            Self::IdentityQuery { .. } => "identityQuery",
            Self::RoleCreate { .. } => "roleCreate",
            Self::RoleGet { .. } => "roleGet",
            Self::RoleUpdate { .. } => "roleUpdate",
            Self::RoleQuery { .. } => "roleQuery",
            Self::RegistryGet { .. } => "registryGet",
            Self::RegistryList => "registryList",
            Self::RegistryUpsert { .. } => "registryUpsert",
            Self::SingletonGet { .. } => "singletonGet",
            Self::SingletonList => "singletonList",
            Self::SingletonUpsert { .. } => "singletonUpsert",
            Self::FunctionInvoke { .. } => "functionInvoke",
            Self::FunctionQuery { .. } => "functionQuery",
            Self::Init { .. } => "init",
        }
    }
}

fn wrap(result: impl serde::Serialize) -> Result<Value, CoreError> {
    Ok(json!({ RESULT_KEY: serde_json::to_value(result)? }))
}

fn delete(ctx: &mut TxContext, name: &str, id: &str, mode: Mode) -> Result<Value, CoreError> {
    lifecycle::delete(ctx, name, id, mode)?;
    Ok(json!({"ok": true, RESULT_KEY: true}))
}

/// Run `op` and render its response.
pub fn dispatch(ctx: &mut TxContext, op: Operation) -> Result<Value, CoreError> {
    match op {
        Operation::AssetCreate { name, data, id, version } => {
            wrap(lifecycle::create(ctx, &name, data, id.as_deref(), version, Mode::Standard)?)
        }
        Operation::AssetCreateDirect { name, data, id, version } => {
            wrap(lifecycle::create(ctx, &name, data, id.as_deref(), version, Mode::Direct)?)
        }
        Operation::AssetGet { name, id, resolve, data } => {
            ctx.set_data(data);
            wrap(lifecycle::get(ctx, &name, &id, resolve, Mode::Standard)?)
        }
        Operation::AssetGetDirect { name, id, resolve } => {
            wrap(lifecycle::get(ctx, &name, &id, resolve, Mode::Direct)?)
        }
        Operation::AssetUpdate { name, id, patch } => {
            wrap(lifecycle::update(ctx, &name, &id, patch, Mode::Standard)?)
        }
        Operation::AssetUpdateDirect { name, id, patch } => {
            wrap(lifecycle::update(ctx, &name, &id, patch, Mode::Direct)?)
        }
        Operation::AssetQuery { name, query, resolve, data } => {
            ctx.set_data(data);
            Ok(serde_json::to_value(lifecycle::query(ctx, &name, query, resolve, Mode::Standard)?)?)
        }
        Operation::AssetQueryDirect { name, query, resolve } => {
            Ok(serde_json::to_value(lifecycle::query(ctx, &name, query, resolve, Mode::Direct)?)?)
        }
        Operation::AssetDelete { name, id } => delete(ctx, &name, &id, Mode::Standard),
        Operation::AssetDeleteDirect { name, id } => delete(ctx, &name, &id, Mode::Direct),
        Operation::AssetHistory { name, id } => wrap(lifecycle::history(ctx, &name, &id)?),
        Operation::AssetMigrate { name, id, patch, version } => {
            wrap(lifecycle::migrate(ctx, &name, &id, patch, version)?)
        }
        Operation::IdentityAddMe { input } => Ok(identity::identity_add_me(ctx, input)?.into_response()),
        Operation::IdentityMe { resolve } => Ok(identity::identity_me(ctx, resolve)?.into_response()),
        Operation::IdentityCreateDirect { data, fingerprint } => wrap(lifecycle::create(
            ctx,
            IDENTITY_ASSET,
            data,
            fingerprint.as_deref(),
            1,
            Mode::Direct,
        )?),
        Operation::IdentityGet { fingerprint, resolve, data } => {
            ctx.set_data(data);
            wrap(lifecycle::get(ctx, IDENTITY_ASSET, &fingerprint, resolve, Mode::Standard)?)
        }
        Operation::IdentityUpdate { fingerprint, patch } => {
            wrap(lifecycle::update(ctx, IDENTITY_ASSET, &fingerprint, patch, Mode::Standard)?)
        }
        Operation::IdentityUpdateDirect { fingerprint, patch } => {
            wrap(lifecycle::update(ctx, IDENTITY_ASSET, &fingerprint, patch, Mode::Direct)?)
        }
        Operation::IdentityQuery { query, resolve } => Ok(serde_json::to_value(lifecycle::query(
            ctx,
            IDENTITY_ASSET,
            query,
            resolve,
            Mode::Standard,
        )?)?),
        Operation::RoleCreate { data, id } => wrap(lifecycle::create(
            ctx,
            ROLE_ASSET,
            data,
            id.as_deref(),
            ANY_VERSION,
            Mode::Standard,
        )?),
        Operation::RoleGet { id, resolve } => {
            wrap(lifecycle::get(ctx, ROLE_ASSET, &id, resolve, Mode::Standard)?)
        }
        Operation::RoleUpdate { id, patch } => {
            wrap(lifecycle::update(ctx, ROLE_ASSET, &id, patch, Mode::Standard)?)
        }
        Operation::RoleQuery { query, resolve } => Ok(serde_json::to_value(lifecycle::query(
            ctx,
            ROLE_ASSET,
            query,
            resolve,
            Mode::Standard,
        )?)?),
        Operation::RegistryGet { name, version } => wrap(registry::registry_get(ctx, &name, version)?),
        Operation::RegistryList => wrap(registry::registry_list(ctx)?),
        Operation::RegistryUpsert { name, data } => wrap(registry::registry_upsert(ctx, &name, &data)?),
        Operation::SingletonGet { name, version } => {
            wrap(registry::singleton_get(ctx, &name, version)?)
        }
        Operation::SingletonList => wrap(registry::singleton_list(ctx)?),
        Operation::SingletonUpsert { name, data } => {
            wrap(registry::singleton_upsert(ctx, &name, &data)?)
        }
        Operation::FunctionInvoke { name, input } => {
            wrap(functions::function_invoke(ctx, &name, &input)?)
        }
        Operation::FunctionQuery { name, input } => {
            wrap(functions::function_query(ctx, &name, &input)?)
        }
        Operation::Init { input } => {
            registry::init(ctx, &input)?;
            Ok(json!({"ok": true}))
        }
    }
}
