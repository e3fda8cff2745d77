//! Per-transaction state.
//!
//! A [`TxContext`] lives for exactly one request. It owns the registry (and
//! through it the ledger transaction), the caller's fingerprint, the
//! request's side-channel data and the lazily loaded access enforcer. Every
//! business hook and function receives it mutably.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerdoc_core::access::{AccessEnforcer, Decision};
use ledgerdoc_core::asset::{AssetExt, Object};
use ledgerdoc_core::error::{CoreError, ResultExt};
use ledgerdoc_core::keys::{IDENTITY_ASSET, ROLES_KEY, ROLE_ASSET};
use ledgerdoc_core::policy::FuncKey;
use ledgerdoc_core::query::Query;
use ledgerdoc_core::stage::Stage;
use ledgerdoc_store::{AssetHistoryItem, LedgerStub, Registry};
use serde_json::Value;

use crate::config::Configuration;
use crate::ids::deterministic_uuid;
use crate::resolver::walk_references;

pub struct TxContext {
    config: Arc<Configuration>,
    registry: Registry,
    certificate: Vec<u8>,
    fingerprint: String,
    data: Option<Object>,
    existing: HashSet<(String, String)>,
    uuid_counter: u64,
    enforcer: Option<AccessEnforcer>,
}

impl TxContext {
    pub fn new(config: Arc<Configuration>, stub: Box<dyn LedgerStub>, certificate: &[u8]) -> Self {
        let fingerprint = config.id_func.fingerprint(certificate);
        Self {
            config,
            registry: Registry::new(stub),
            certificate: certificate.to_vec(),
            fingerprint,
            data: None,
            existing: HashSet::new(),
            uuid_counter: 0,
            enforcer: None,
        }
    }

    pub fn config(&self) -> Arc<Configuration> {
        Arc::clone(&self.config)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn into_stub(self) -> Box<dyn LedgerStub> {
        self.registry.into_stub()
    }

    /// Fingerprint of the caller.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Caller fingerprint under the previous id function, if one is configured.
    pub fn previous_fingerprint(&self) -> Option<String> {
        self.config
            .previous_id_func
            .map(|func| func.fingerprint(&self.certificate))
    }

    pub fn tx_id(&self) -> &str {
        self.registry.stub().tx_id()
    }

    pub fn tx_timestamp(&self) -> DateTime<Utc> {
        self.registry.stub().tx_timestamp()
    }

    /// Side-channel data of the request, passed to `AfterGet` and `AfterResolve`.
    pub fn data(&self) -> Option<&Object> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: Option<Object>) {
        self.data = data;
    }

    /// Next generated asset id of this transaction.
    pub fn next_uuid(&mut self) -> String {
        let id = deterministic_uuid(self.tx_id(), self.tx_timestamp(), self.uuid_counter);
        self.uuid_counter += 1;
        id
    }

    // -- assets ----------------------------------------------------------

    /// Treat `name`/`id` as existing before it is persisted.
    ///
    /// Lets an asset being created reference itself.
    pub fn mark_existing(&mut self, name: &str, id: &str) {
        self.existing
            .insert((name.to_lowercase(), id.to_lowercase()));
    }

    pub fn exists_asset(&mut self, name: &str, id: &str) -> Result<bool, CoreError> {
        if self
            .existing
            .contains(&(name.to_lowercase(), id.to_lowercase()))
        {
            return Ok(true);
        }
        self.registry.exists_asset(name, id)
    }

    pub fn make_asset(&mut self, name: &str, id: &str, version: i64) -> Result<Object, CoreError> {
        self.registry.make_asset(name, id, version)
    }

    /// Stored asset, with references inlined when `resolve` is set.
    pub fn get_asset(
        &mut self,
        name: &str,
        id: &str,
        resolve: bool,
        fail_on_not_found: bool,
    ) -> Result<Option<Object>, CoreError> {
        let Some(mut asset) = self.registry.get_asset(name, id, fail_on_not_found)? else {
            return Ok(None);
        };
        if resolve {
            walk_references(self, &mut asset, true)?;
        }
        Ok(Some(asset))
    }

    /// Stored asset that must exist.
    pub fn require_asset(&mut self, name: &str, id: &str, resolve: bool) -> Result<Object, CoreError> {
        self.get_asset(name, id, resolve, true)?.ok_or_else(|| {
            CoreError::NotFound(format!("asset name: {name}, id: {id} not found"))
        })
    }

    /// Persist an asset after schema validation and, when `check_refs`
    /// is set, reference validation.
    pub fn put_asset(&mut self, asset: &Object, is_create: bool, check_refs: bool) -> Result<(), CoreError> {
        if check_refs {
            let mut copy = asset.clone();
            walk_references(self, &mut copy, false).context("reference validation failed")?;
        }
        self.registry.put_asset(asset, is_create)
    }

    pub fn delete_asset(&mut self, name: &str, id: &str) -> Result<(), CoreError> {
        self.registry.delete_asset(name, id)
    }

    pub fn asset_history(&mut self, name: &str, id: &str) -> Result<Vec<AssetHistoryItem>, CoreError> {
        self.registry.asset_history(name, id)
    }

    /// One page of assets, optionally resolved.
    pub fn query_assets(
        &mut self,
        name: &str,
        query: Query,
        resolve: bool,
    ) -> Result<(Vec<Object>, String), CoreError> {
        let page_size = self.config.page_size;
        let (mut assets, bookmark) = self.registry.query_assets(name, query, page_size)?;
        if resolve {
            for asset in &mut assets {
                walk_references(self, asset, true)?;
            }
        }
        Ok((assets, bookmark))
    }

    // -- identity --------------------------------------------------------

    /// Caller's identity with every granted role inlined.
    pub fn this_identity_resolved(&mut self) -> Result<Object, CoreError> {
        let fingerprint = self.fingerprint.clone();
        let identity = self
            .registry
            .get_asset(IDENTITY_ASSET, &fingerprint, false)?
            .ok_or_else(|| {
                CoreError::BadRequest(format!(
                    "cannot get identity for fingerprint: {fingerprint}. Did you call identityAddMe?"
                ))
            })?;
        self.inline_roles(identity)
    }

    /// Replace the role ids of `identity` with the role assets.
    pub fn inline_roles(&mut self, mut identity: Object) -> Result<Object, CoreError> {
        let mut roles = Vec::new();
        for role_id in identity.string_list(ROLES_KEY)? {
            let role = self
                .registry
                .get_asset(ROLE_ASSET, &role_id, false)?
                .ok_or_else(|| {
                    CoreError::NotFound(format!("role: {role_id} granted to identity not found"))
                })?;
            roles.push(Value::Object(role));
        }
        if identity.contains_key(ROLES_KEY) {
            identity.insert(ROLES_KEY.into(), Value::Array(roles));
        }
        Ok(identity)
    }

    // -- access ----------------------------------------------------------

    fn enforcer(&mut self) -> Result<&mut AccessEnforcer, CoreError> {
        if self.enforcer.is_none() {
            let identity = self.this_identity_resolved()?;
            let mut enforcer = AccessEnforcer::new();
            enforcer.load_roles(&identity)?;
            self.enforcer = Some(enforcer);
        }
        self.enforcer
            .as_mut()
            .ok_or_else(|| CoreError::Internal("access enforcer not loaded".into()))
    }

    /// Decide `action` on `object` for the caller without failing on denial.
    pub fn check_custom(
        &mut self,
        object: &str,
        action: &str,
        asset: Option<&Object>,
    ) -> Result<Decision, CoreError> {
        let subject = self.fingerprint.clone();
        self.enforcer()?.enforce_custom(object, &subject, action, asset)
    }

    /// Require `action` on `object` (Forbidden otherwise).
    pub fn enforce_custom(
        &mut self,
        object: &str,
        action: &str,
        asset: Option<&Object>,
    ) -> Result<(), CoreError> {
        self.check_custom(object, action, asset)?.into_result()
    }

    pub fn check_asset(&mut self, asset: &Object, action: &str) -> Result<Decision, CoreError> {
        let object = asset.permission_object()?;
        self.check_custom(&object, action, Some(asset))
    }

    /// Require `action` on `asset`, honouring its overrides.
    pub fn enforce_asset(&mut self, asset: &Object, action: &str) -> Result<(), CoreError> {
        self.check_asset(asset, action)?.into_result()
    }

    pub fn filter_assets(&mut self, assets: Vec<Object>, action: &str) -> Result<Vec<Object>, CoreError> {
        let subject = self.fingerprint.clone();
        self.enforcer()?.filter_assets(assets, &subject, action)
    }

    pub fn is_superuser(&mut self) -> Result<bool, CoreError> {
        let subject = self.fingerprint.clone();
        Ok(self.enforcer()?.is_superuser(&subject))
    }

    // -- business logic --------------------------------------------------

    /// Run the `stage` chain selected by `post`.
    pub fn run_stage(
        &mut self,
        stage: Stage,
        pre: Option<&Object>,
        post: Object,
    ) -> Result<Object, CoreError> {
        let config = self.config();
        config.business.execute(self, stage, pre, post)
    }

    /// Run the `stage` chain selected by `source`.
    pub fn run_stage_custom(
        &mut self,
        stage: Stage,
        source: &Object,
        pre: Option<&Object>,
        post: Object,
    ) -> Result<Object, CoreError> {
        let config = self.config();
        config.business.execute_custom(self, stage, source, pre, post)
    }

    pub fn run_stage_for_key(
        &mut self,
        key: &FuncKey,
        stage: Stage,
        pre: Option<&Object>,
        post: Object,
    ) -> Result<Object, CoreError> {
        let config = self.config();
        config.business.execute_for_key(self, key, stage, pre, post)
    }
}
