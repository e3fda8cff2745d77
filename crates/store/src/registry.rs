//! Versioned schema registry and asset persistence.
//!
//! The registry owns the transaction's [`LedgerStub`] and stores three kinds
//! of records in it:
//!
//! - registry items `(name, version) -> {destination, schema}` plus a
//!   latest-version pointer per name,
//! - singletons `(name, version) -> {value}` plus a latest-version pointer,
//! - assets, under `(DOCTYPE, id)` in public state or in the private
//!   collection named after the document type.
//!
//! `identity` and `role` are built in: version 1, public state, fixed
//! schemas. They can not be upserted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ledgerdoc_core::asset::{id_key, make_bare_asset, storage_name, AssetExt, Object};
use ledgerdoc_core::error::{CoreError, ResultExt, Status};
use ledgerdoc_core::keys::{IDENTITY_ASSET, ROLE_ASSET};
use ledgerdoc_core::policy::ANY_VERSION;
use ledgerdoc_core::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ledger::{composite_key, printable_key, LedgerStub};
use crate::memory::decode_object;
use crate::schema;

const REGISTRY_PREFIX: &str = "REGISTRY";
const LATEST_REGISTRY_PREFIX: &str = "LATEST_REGISTRY";
const SINGLETON_PREFIX: &str = "SINGLETON";
const LATEST_SINGLETON_PREFIX: &str = "LATEST_SINGLETON";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where assets of a document type are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    State,
    PrivateData,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::PrivateData => "private_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryItem {
    pub destination: Destination,
    pub schema: Value,
}

/// One committed version of an asset, as returned by `assetHistory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetHistoryItem {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    /// Stored asset; `None` for a deletion.
    pub value: Option<Object>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestPointer {
    version: i64,
    hash: String,
}

fn is_builtin(name: &str) -> bool {
    name == IDENTITY_ASSET || name == ROLE_ASSET
}

fn builtin_item(name: &str) -> Option<RegistryItem> {
    let schema = match name {
        IDENTITY_ASSET => schema::identity_schema(),
        ROLE_ASSET => schema::role_schema(),
        _ => return None,
    };
    Some(RegistryItem {
        destination: Destination::State,
        schema,
    })
}

fn content_hash(value: &Value) -> Result<String, CoreError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct Registry {
    stub: Box<dyn LedgerStub>,
    items: HashMap<(String, i64), RegistryItem>,
}

impl Registry {
    pub fn new(stub: Box<dyn LedgerStub>) -> Self {
        Self {
            stub,
            items: HashMap::new(),
        }
    }

    pub fn stub(&self) -> &dyn LedgerStub {
        self.stub.as_ref()
    }

    pub fn stub_mut(&mut self) -> &mut dyn LedgerStub {
        self.stub.as_mut()
    }

    pub fn into_stub(self) -> Box<dyn LedgerStub> {
        self.stub
    }

    // -- raw state -------------------------------------------------------

    pub fn get_json(&self, key: &str) -> Result<Option<Value>, CoreError> {
        match self.stub.get_state(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_json(&mut self, key: &str, value: &Value) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.stub.put_state(key, bytes)
    }

    pub fn delete_key(&mut self, key: &str) -> Result<(), CoreError> {
        self.stub.del_state(key)
    }

    // -- versioned records -----------------------------------------------

    fn latest(&self, prefix: &str, name: &str) -> Result<Option<LatestPointer>, CoreError> {
        match self.get_json(&composite_key(prefix, &[name]))? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store `value` as a new version of `name` unless it equals the latest.
    fn upsert_versioned(
        &mut self,
        latest_prefix: &str,
        prefix: &str,
        name: &str,
        value: &Value,
    ) -> Result<(i64, bool), CoreError> {
        let hash = content_hash(value)?;
        let latest = self.latest(latest_prefix, name)?;
        if let Some(pointer) = &latest {
            if pointer.hash == hash {
                return Ok((pointer.version, false));
            }
        }

        let version = latest.map_or(1, |p| p.version + 1);
        self.put_json(&composite_key(prefix, &[name, &version.to_string()]), value)?;
        let pointer = serde_json::to_value(LatestPointer { version, hash })?;
        self.put_json(&composite_key(latest_prefix, &[name]), &pointer)?;
        Ok((version, true))
    }

    fn names(&self, latest_prefix: &str) -> Result<Vec<String>, CoreError> {
        let prefix = composite_key(latest_prefix, &[]);
        let mut names: Vec<String> = self
            .stub
            .scan_state(&prefix)?
            .into_iter()
            .map(|(key, _)| printable_key(&key[prefix.len()..]))
            .collect();
        names.sort();
        Ok(names)
    }

    // -- registry items --------------------------------------------------

    /// Item `name` at `version` (`-1` = latest), with the resolved version.
    pub fn get_item(&mut self, name: &str, version: i64) -> Result<(RegistryItem, i64), CoreError> {
        let name = name.to_lowercase();
        if let Some(item) = builtin_item(&name) {
            if version == ANY_VERSION || version == 1 {
                return Ok((item, 1));
            }
            return Err(CoreError::NotFound(format!(
                "registryItem name: {name}, version: {version} not found"
            )));
        }

        let resolved = if version == ANY_VERSION {
            self.latest(LATEST_REGISTRY_PREFIX, &name)?
                .map(|p| p.version)
                .ok_or_else(|| CoreError::NotFound(format!("registryItem name: {name} not found")))?
        } else {
            version
        };

        if let Some(item) = self.items.get(&(name.clone(), resolved)) {
            return Ok((item.clone(), resolved));
        }

        let key = composite_key(REGISTRY_PREFIX, &[&name, &resolved.to_string()]);
        let value = self.get_json(&key)?.ok_or_else(|| {
            CoreError::NotFound(format!(
                "registryItem name: {name}, version: {resolved} not found"
            ))
        })?;
        let item: RegistryItem = serde_json::from_value(value)?;
        self.items.insert((name, resolved), item.clone());
        Ok((item, resolved))
    }

    /// Latest version of every item, built-ins included, sorted by name.
    pub fn list_items(&self) -> Result<Vec<String>, CoreError> {
        let mut names = self.names(LATEST_REGISTRY_PREFIX)?;
        names.push(IDENTITY_ASSET.to_string());
        names.push(ROLE_ASSET.to_string());
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Store a new version of item `name`; returns the effective version.
    ///
    /// An item equal to the latest version is not stored again. The
    /// destination of an existing item can not change.
    pub fn upsert_item(&mut self, name: &str, item: &Value) -> Result<i64, CoreError> {
        let name = name.to_lowercase();
        if is_builtin(&name) {
            return Err(CoreError::BadRequest(format!(
                "registry item: {name} is built in and can not be changed"
            )));
        }
        schema::validate(&schema::registry_item_schema(), item, "registry item")?;
        let parsed: RegistryItem = serde_json::from_value(item.clone())?;
        schema::check_schema(&name, &parsed.schema)?;

        match self.get_item(&name, ANY_VERSION) {
            Ok((current, _)) if current.destination != parsed.destination => {
                return Err(CoreError::BadRequest(format!(
                    "unable to change destination of: {name}, from: {}, to: {}",
                    current.destination.as_str(),
                    parsed.destination.as_str()
                )));
            }
            Ok(_) => {}
            Err(e) if e.status() == Status::NotFound => {}
            Err(e) => return Err(e),
        }

        let (version, stored) =
            self.upsert_versioned(LATEST_REGISTRY_PREFIX, REGISTRY_PREFIX, &name, item)?;
        if stored {
            tracing::info!(name = %name, version, "registry item stored");
        }
        Ok(version)
    }

    // -- singletons ------------------------------------------------------

    pub fn get_singleton(&self, name: &str, version: i64) -> Result<(Value, i64), CoreError> {
        let resolved = if version == ANY_VERSION {
            self.latest(LATEST_SINGLETON_PREFIX, name)?
                .map(|p| p.version)
                .ok_or_else(|| CoreError::NotFound(format!("singleton name: {name} not found")))?
        } else {
            version
        };
        let key = composite_key(SINGLETON_PREFIX, &[name, &resolved.to_string()]);
        let value = self.get_json(&key)?.ok_or_else(|| {
            CoreError::NotFound(format!("singleton name: {name}, version: {resolved} not found"))
        })?;
        Ok((value, resolved))
    }

    pub fn list_singletons(&self) -> Result<Vec<String>, CoreError> {
        self.names(LATEST_SINGLETON_PREFIX)
    }

    pub fn upsert_singleton(&mut self, name: &str, singleton: &Value) -> Result<i64, CoreError> {
        schema::validate(&schema::singleton_schema(), singleton, "singleton")?;
        let (version, stored) =
            self.upsert_versioned(LATEST_SINGLETON_PREFIX, SINGLETON_PREFIX, name, singleton)?;
        if stored {
            tracing::info!(name, version, "singleton stored");
        }
        Ok(version)
    }

    // -- assets ----------------------------------------------------------

    /// Bare asset for `name` at `version` (`-1` = latest).
    pub fn make_asset(&mut self, name: &str, id: &str, version: i64) -> Result<Object, CoreError> {
        let (_, resolved) = self.get_item(name, version).context("get registry item")?;
        Ok(make_bare_asset(name, id, resolved))
    }

    fn asset_location(&mut self, name: &str, id: &str) -> Result<(Destination, String), CoreError> {
        let (item, _) = self.get_item(name, ANY_VERSION)?;
        Ok((item.destination, composite_key(&storage_name(name), &[id])))
    }

    fn read_asset(
        &mut self,
        name: &str,
        id: &str,
    ) -> Result<(Option<Vec<u8>>, Destination, String), CoreError> {
        let (destination, key) = self.asset_location(name, id)?;
        let bytes = match destination {
            Destination::State => self.stub.get_state(&key)?,
            Destination::PrivateData => self.stub.get_private_data(&storage_name(name), &key)?,
        };
        Ok((bytes, destination, key))
    }

    /// Stored asset, or `None` when missing and `fail_on_not_found` is off.
    pub fn get_asset(
        &mut self,
        name: &str,
        id: &str,
        fail_on_not_found: bool,
    ) -> Result<Option<Object>, CoreError> {
        let (bytes, _, key) = self.read_asset(name, id)?;
        match bytes {
            Some(bytes) => Ok(Some(decode_object(&bytes)?)),
            None if fail_on_not_found => Err(CoreError::NotFound(format!(
                "state entry not found: {}",
                printable_key(&key)
            ))),
            None => Ok(None),
        }
    }

    pub fn exists_asset(&mut self, name: &str, id: &str) -> Result<bool, CoreError> {
        Ok(self.read_asset(name, id)?.0.is_some())
    }

    /// Validate an asset against the schema of its own version.
    pub fn validate_asset(&mut self, asset: &Object) -> Result<(), CoreError> {
        let name = asset.doc_type()?;
        let (item, _) = self.get_item(&name, asset.version()?)?;
        let schema = schema::augment(&name, &item.schema)?;
        schema::validate(&schema, &Value::Object(asset.clone()), &format!("asset name: {name}"))
    }

    /// Validate and store an asset.
    ///
    /// `is_create` demands the key be absent; otherwise it must exist.
    pub fn put_asset(&mut self, asset: &Object, is_create: bool) -> Result<(), CoreError> {
        self.validate_asset(asset)?;
        let name = asset.doc_type()?;
        let id = asset.asset_id()?;
        let (existing, destination, key) = self.read_asset(&name, &id)?;
        let where_ = match destination {
            Destination::State => "state key",
            Destination::PrivateData => "private data key",
        };

        match (is_create, existing.is_some()) {
            (true, true) => {
                return Err(CoreError::Conflict(format!(
                    "{where_} already exists: {}",
                    printable_key(&key)
                )))
            }
            (false, false) => {
                return Err(CoreError::Conflict(format!(
                    "attempt to update non-existent {where_}: {}",
                    printable_key(&key)
                )))
            }
            _ => {}
        }

        let bytes = serde_json::to_vec(asset)?;
        match destination {
            Destination::State => self.stub.put_state(&key, bytes),
            Destination::PrivateData => self.stub.put_private_data(&storage_name(&name), &key, bytes),
        }
    }

    pub fn delete_asset(&mut self, name: &str, id: &str) -> Result<(), CoreError> {
        let (destination, key) = self.asset_location(name, id)?;
        match destination {
            Destination::State => self.stub.del_state(&key),
            Destination::PrivateData => self.stub.del_private_data(&storage_name(name), &key),
        }
    }

    /// Committed versions of a public-state asset, oldest first.
    pub fn asset_history(&mut self, name: &str, id: &str) -> Result<Vec<AssetHistoryItem>, CoreError> {
        let (destination, key) = self.asset_location(name, id)?;
        if destination == Destination::PrivateData {
            return Err(CoreError::BadRequest(format!(
                "history is not kept for private data asset: {name}"
            )));
        }
        self.stub
            .key_history(&key)?
            .into_iter()
            .map(|entry| {
                Ok(AssetHistoryItem {
                    tx_id: entry.tx_id,
                    timestamp: entry.timestamp,
                    is_delete: entry.value.is_none(),
                    value: entry.value.as_deref().map(decode_object).transpose()?,
                })
            })
            .collect()
    }

    /// One page of assets of `name` matching `query`.
    ///
    /// A `fields` projection always keeps the service keys.
    pub fn query_assets(
        &mut self,
        name: &str,
        mut query: Query,
        page_size: usize,
    ) -> Result<(Vec<Object>, String), CoreError> {
        let (item, _) = self.get_item(name, ANY_VERSION)?;
        query.restrict_doc_type(&storage_name(name));
        if !query.fields.is_empty() {
            for key in [
                ledgerdoc_core::keys::DOC_TYPE_KEY,
                ledgerdoc_core::keys::VERSION_KEY,
                id_key(name),
            ] {
                if !query.fields.iter().any(|f| f == key) {
                    query.fields.push(key.to_string());
                }
            }
        }

        let page_size = query.page_size(page_size);
        let page = match item.destination {
            Destination::State => self.stub.query_state(&query, page_size)?,
            Destination::PrivateData => {
                self.stub
                    .query_private_data(&storage_name(name), &query, page_size)?
            }
        };

        let assets = page
            .records
            .iter()
            .map(|(_, bytes)| decode_object(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((assets, page.bookmark))
    }
}
