//! Schema-guided reference validation and resolution.
//!
//! [`walk_references`] visits every string leaf of an asset, asks the
//! asset's schema whether the leaf is a reference, and checks that the
//! target exists. When resolving, the target document replaces the id at
//! the same path.
//!
//! Leaves are collected from the asset before anything is written back, so
//! each path is read once and written at most once. Recursion into resolved
//! targets is gated only by the recursive whitelist and same-name
//! suppression; a whitelist forming a cycle between different document
//! types is not detected.

use std::collections::BTreeSet;

use ledgerdoc_core::asset::{AssetExt, Object};
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::reference::{analyze_ref, description_pointer};
use ledgerdoc_core::stage::Stage;
use serde_json::Value;

use crate::context::TxContext;

/// Validate (and when `resolve` is set, inline) the references of `asset`.
///
/// Missing targets do not stop the walk; they are reported together,
/// deduplicated and sorted, as [`CoreError::BrokenReferences`].
pub fn walk_references(ctx: &mut TxContext, asset: &mut Object, resolve: bool) -> Result<(), CoreError> {
    let this_name = asset.doc_type()?;
    let this_id = asset.asset_id()?;
    let (item, _) = ctx.registry_mut().get_item(&this_name, asset.version()?)?;
    let config = ctx.config();

    let mut leaves = Vec::new();
    for (key, value) in asset.iter() {
        collect_leaves(value, &mut vec![key.clone()], &mut leaves);
    }

    let mut broken = BTreeSet::new();
    let mut hard: Option<CoreError> = None;

    for (path, raw) in leaves {
        // Blacklisted fields are left opaque when resolving, target unchecked.
        let field_path: Vec<String> = path.iter().filter(|s| !is_index(s)).cloned().collect();
        if resolve && config.resolve.is_field_blacklisted(&this_name, &field_path) {
            continue;
        }

        let Some(description) = item
            .schema
            .pointer(&description_pointer(&path))
            .and_then(Value::as_str)
        else {
            continue;
        };

        let target = match analyze_ref(description, &raw) {
            Ok(Some(target)) => target,
            Ok(None) => continue,
            Err(e) => {
                hard = Some(e);
                break;
            }
        };
        if config.resolve.is_blacklisted(&target.name) {
            continue;
        }

        match ctx.exists_asset(&target.name, &target.id) {
            Ok(true) => {}
            Ok(false) => {
                broken.insert(format!(
                    "Referenced asset '{}' with ID '{}' not found (currently resolved asset name: {}, uuid: {})",
                    target.name, target.id, this_name, this_id
                ));
                continue;
            }
            Err(e) => {
                hard = Some(e);
                break;
            }
        }

        if !resolve {
            continue;
        }

        // Marked as existing but not stored yet.
        let mut resolved = match ctx.registry_mut().get_asset(&target.name, &target.id, false) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => continue,
            Err(e) => {
                hard = Some(e);
                break;
            }
        };

        let field = field_path.last().map(String::as_str).unwrap_or_default();
        if config.resolve.should_recurse(&this_name, field, &target.name) {
            match walk_references(ctx, &mut resolved, true) {
                Ok(()) => {}
                Err(CoreError::BrokenReferences(nested)) => {
                    broken.extend(nested);
                    continue;
                }
                Err(e) => {
                    hard = Some(e);
                    break;
                }
            }
        }

        let data = ctx.data().cloned();
        let resolved = match ctx.run_stage(Stage::AfterResolve, data.as_ref(), resolved) {
            Ok(resolved) => resolved,
            Err(e) => {
                hard = Some(e);
                break;
            }
        };

        set_at_path(asset, &path, Value::Object(resolved));
    }

    match (hard, broken.is_empty()) {
        (None, true) => Ok(()),
        (None, false) => Err(CoreError::BrokenReferences(broken.into_iter().collect())),
        (Some(e), true) => Err(e),
        (Some(e), false) => {
            let collected = CoreError::BrokenReferences(broken.into_iter().collect());
            Err(e.context(collected.to_string()))
        }
    }
}

fn is_index(segment: &str) -> bool {
    segment.parse::<usize>().is_ok()
}

/// Every string leaf below `value` with its data path.
fn collect_leaves(value: &Value, path: &mut Vec<String>, out: &mut Vec<(Vec<String>, String)>) {
    match value {
        Value::String(s) => out.push((path.clone(), s.clone())),
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                collect_leaves(child, path, out);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index.to_string());
                collect_leaves(child, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

fn set_at_path(root: &mut Object, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let Some(mut slot) = root.get_mut(first) else {
        return;
    };
    for segment in rest {
        let next = match slot {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(next) => slot = next,
            None => return,
        }
    }
    *slot = value;
}
