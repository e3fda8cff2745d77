//! Stock business-logic hooks.
//!
//! Register these in [`StageMembers`](ledgerdoc_core::policy::StageMembers)
//! chains to guard ordinary assets, which carry no built-in permission
//! check outside direct mode:
//!
//! ```ignore
//! StageMembers::new()
//!     .on(Stage::BeforeCreate, blogic::enforce_create)
//!     .on(Stage::AfterGet, blogic::enforce_read)
//! ```

use ledgerdoc_core::access::Decision;
use ledgerdoc_core::asset::{id_key, AssetExt, Object};
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::keys::action;
use serde_json::Value;

use crate::context::TxContext;

pub fn enforce_read(ctx: &mut TxContext, _pre: Option<&Object>, post: Object) -> Result<Object, CoreError> {
    ctx.enforce_asset(&post, action::READ)?;
    Ok(post)
}

pub fn enforce_create(ctx: &mut TxContext, _pre: Option<&Object>, post: Object) -> Result<Object, CoreError> {
    ctx.enforce_asset(&post, action::CREATE)?;
    Ok(post)
}

pub fn enforce_update(ctx: &mut TxContext, _pre: Option<&Object>, post: Object) -> Result<Object, CoreError> {
    ctx.enforce_asset(&post, action::UPDATE)?;
    Ok(post)
}

pub fn enforce_delete(ctx: &mut TxContext, _pre: Option<&Object>, post: Object) -> Result<Object, CoreError> {
    ctx.enforce_asset(&post, action::DELETE)?;
    Ok(post)
}

/// Replace an unreadable asset with `{<idKey>: id, "error": "permission denied"}`.
pub fn filter_read(ctx: &mut TxContext, _pre: Option<&Object>, post: Object) -> Result<Object, CoreError> {
    match ctx.check_asset(&post, action::READ)? {
        Decision::Granted => Ok(post),
        Decision::Denied(_) => {
            let name = post.doc_type()?;
            let mut placeholder = Object::new();
            placeholder.insert(
                id_key(&name).into(),
                Value::String(post.asset_id()?),
            );
            placeholder.insert("error".into(), Value::String("permission denied".into()));
            Ok(placeholder)
        }
    }
}

/// Always fails.
pub fn deny(_ctx: &mut TxContext, _pre: Option<&Object>, _post: Object) -> Result<Object, CoreError> {
    Err(CoreError::Forbidden("operation is denied".into()))
}
