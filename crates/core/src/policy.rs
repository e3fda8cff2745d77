//! Stage-based business policy executor.
//!
//! Policies are keyed by [`FuncKey`] (document name + schema version) and
//! then by [`Stage`]. Each stage holds an ordered chain of hooks; a hook
//! receives the shared `pre` document and the previous hook's output, and
//! returns the next document. The executor is generic over the transaction
//! context type so this crate stays free of any storage dependency.

use std::collections::HashMap;

use crate::asset::{AssetExt, Object};
use crate::error::{CoreError, ResultExt};
use crate::stage::Stage;

/// Version that matches any asset version of a name.
///
/// Only consulted when no policy is registered for the exact version.
pub const ANY_VERSION: i64 = -1;

/// A single business-logic hook.
pub type BusinessHook<C> =
    Box<dyn Fn(&mut C, Option<&Object>, Object) -> Result<Object, CoreError> + Send + Sync>;

// ---------------------------------------------------------------------------
// FuncKey
// ---------------------------------------------------------------------------

/// Document name and version a policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncKey {
    pub name: String,
    pub version: i64,
}

impl FuncKey {
    pub fn new(name: &str, version: i64) -> Self {
        Self {
            name: name.to_lowercase(),
            version,
        }
    }

    /// Wildcard key for every version of `name`.
    pub fn any_version(name: &str) -> Self {
        Self::new(name, ANY_VERSION)
    }

    /// Key of an asset document, `None` when the document is not a full asset.
    pub fn of_asset(asset: &Object) -> Option<Self> {
        if !asset.is_asset() {
            return None;
        }
        Some(Self::new(&asset.doc_type().ok()?, asset.version().ok()?))
    }
}

impl std::fmt::Display for FuncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

// ---------------------------------------------------------------------------
// StageMembers
// ---------------------------------------------------------------------------

/// Hook chains of one document version, per stage.
pub struct StageMembers<C> {
    chains: HashMap<Stage, Vec<BusinessHook<C>>>,
}

impl<C> Default for StageMembers<C> {
    fn default() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }
}

impl<C> StageMembers<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook to the chain of `stage`.
    pub fn on<F>(mut self, stage: Stage, hook: F) -> Self
    where
        F: Fn(&mut C, Option<&Object>, Object) -> Result<Object, CoreError> + Send + Sync + 'static,
    {
        self.chains.entry(stage).or_default().push(Box::new(hook));
        self
    }

    fn chain(&self, stage: Stage) -> &[BusinessHook<C>] {
        self.chains.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// BusinessExecutor
// ---------------------------------------------------------------------------

pub struct BusinessExecutor<C> {
    policies: HashMap<FuncKey, StageMembers<C>>,
}

impl<C> Default for BusinessExecutor<C> {
    fn default() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }
}

impl<C> BusinessExecutor<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) every stage chain of `key`.
    pub fn set_policy(&mut self, key: FuncKey, members: StageMembers<C>) {
        self.policies.insert(key, members);
    }

    /// Hook chain for `key` at `stage`.
    ///
    /// Falls back to the wildcard version only when nothing at all is
    /// registered for the exact version.
    pub fn policy(&self, key: &FuncKey, stage: Stage) -> &[BusinessHook<C>] {
        let key = FuncKey::new(&key.name, key.version);
        self.policies
            .get(&key)
            .or_else(|| self.policies.get(&FuncKey::any_version(&key.name)))
            .map(|members| members.chain(stage))
            .unwrap_or(&[])
    }

    /// Run the chain selected by `post` itself.
    pub fn execute(
        &self,
        ctx: &mut C,
        stage: Stage,
        pre: Option<&Object>,
        post: Object,
    ) -> Result<Object, CoreError> {
        let chain: &[BusinessHook<C>] = match FuncKey::of_asset(&post) {
            Some(key) => self.policy(&key, stage),
            None => &[],
        };
        run_chain(ctx, chain, pre, post).with_context(|| format!("stage {stage} failed"))
    }

    /// Run the chain selected by `source` on unrelated `pre`/`post` documents.
    pub fn execute_custom(
        &self,
        ctx: &mut C,
        stage: Stage,
        source: &Object,
        pre: Option<&Object>,
        post: Object,
    ) -> Result<Object, CoreError> {
        let chain: &[BusinessHook<C>] = match FuncKey::of_asset(source) {
            Some(key) => self.policy(&key, stage),
            None => &[],
        };
        run_chain(ctx, chain, pre, post).with_context(|| format!("stage {stage} failed"))
    }

    /// Run the chain registered under an explicit key.
    pub fn execute_for_key(
        &self,
        ctx: &mut C,
        key: &FuncKey,
        stage: Stage,
        pre: Option<&Object>,
        post: Object,
    ) -> Result<Object, CoreError> {
        run_chain(ctx, self.policy(key, stage), pre, post)
            .with_context(|| format!("stage {stage} failed"))
    }
}

fn run_chain<C>(
    ctx: &mut C,
    chain: &[BusinessHook<C>],
    pre: Option<&Object>,
    post: Object,
) -> Result<Object, CoreError> {
    let mut next = post;
    for (index, hook) in chain.iter().enumerate() {
        next = hook(ctx, pre, next).with_context(|| format!("hook #{index} returned error"))?;
    }
    Ok(next)
}
