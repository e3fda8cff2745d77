//! Engine configuration.
//!
//! [`EngineSettings`] holds the scalar knobs read from the environment;
//! [`Configuration`] is the immutable value shared by every transaction:
//! settings plus the business and function policies registered in code
//! through [`ConfigurationBuilder`].

use std::collections::HashSet;

use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::function::{FunctionExecutor, FunctionHook};
use ledgerdoc_core::keys::DEFAULT_PAGE_SIZE;
use ledgerdoc_core::policy::{BusinessExecutor, FuncKey, StageMembers};
use ledgerdoc_core::reference::ResolveRules;

use crate::context::TxContext;
use crate::functions;
use crate::ids::IdFunc;

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Maximum number of assets returned by one query page.
    pub page_size: usize,
    /// Fingerprint function of the caller certificate.
    pub id_func: IdFunc,
    /// Fingerprint function identities are migrated from, if any.
    pub previous_id_func: Option<IdFunc>,
    /// Document names never validated nor resolved as references.
    pub resolve_blacklist: Vec<String>,
    /// `<asset>.<field>` entries allowing recursive resolution.
    pub recursive_resolve_whitelist: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            id_func: IdFunc::Sha512,
            previous_id_func: None,
            resolve_blacklist: Vec::new(),
            recursive_resolve_whitelist: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var                                 | Default  |
    /// |-----------------------------------------|----------|
    /// | `LEDGERDOC_PAGE_SIZE`                   | `10`     |
    /// | `LEDGERDOC_ID_FUNC`                     | `sha512` |
    /// | `LEDGERDOC_PREVIOUS_ID_FUNC`            | unset    |
    /// | `LEDGERDOC_RESOLVE_BLACKLIST`           | empty    |
    /// | `LEDGERDOC_RECURSIVE_RESOLVE_WHITELIST` | empty    |
    ///
    /// List values are comma-separated.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let page_size = match lookup("LEDGERDOC_PAGE_SIZE") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(CoreError::BadRequest(format!(
                        "LEDGERDOC_PAGE_SIZE must be a positive integer, got: {raw}"
                    )))
                }
            },
            None => defaults.page_size,
        };

        let id_func = match lookup("LEDGERDOC_ID_FUNC") {
            Some(raw) => IdFunc::from_str(&raw)?,
            None => defaults.id_func,
        };

        let previous_id_func = match lookup("LEDGERDOC_PREVIOUS_ID_FUNC") {
            Some(raw) if !raw.trim().is_empty() => Some(IdFunc::from_str(&raw)?),
            _ => None,
        };

        Ok(Self {
            page_size,
            id_func,
            previous_id_func,
            resolve_blacklist: split_list(lookup("LEDGERDOC_RESOLVE_BLACKLIST")),
            recursive_resolve_whitelist: split_list(lookup(
                "LEDGERDOC_RECURSIVE_RESOLVE_WHITELIST",
            )),
        })
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Immutable engine configuration, built once and shared by transactions.
pub struct Configuration {
    pub business: BusinessExecutor<TxContext>,
    pub functions: FunctionExecutor<TxContext>,
    pub resolve: ResolveRules,
    pub id_func: IdFunc,
    pub previous_id_func: Option<IdFunc>,
    pub page_size: usize,
}

impl Configuration {
    pub fn builder(settings: EngineSettings) -> ConfigurationBuilder {
        ConfigurationBuilder::new(settings)
    }
}

pub struct ConfigurationBuilder {
    settings: EngineSettings,
    business: BusinessExecutor<TxContext>,
    functions: FunctionExecutor<TxContext>,
    field_blacklist: Vec<(String, String)>,
}

impl ConfigurationBuilder {
    /// Start from `settings` with the built-in functions registered.
    pub fn new(settings: EngineSettings) -> Self {
        let mut functions = FunctionExecutor::new();
        functions::register_builtins(&mut functions);
        Self {
            settings,
            business: BusinessExecutor::new(),
            functions,
            field_blacklist: Vec::new(),
        }
    }

    /// Business policy of `name` at `version` (`-1` for every version).
    pub fn business_policy(
        mut self,
        name: &str,
        version: i64,
        members: StageMembers<TxContext>,
    ) -> Self {
        self.business.set_policy(FuncKey::new(name, version), members);
        self
    }

    /// Register a single-hook function, replacing any previous one.
    pub fn function<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&mut TxContext, &Object, Object) -> Result<Object, CoreError> + Send + Sync + 'static,
    {
        self.functions.register(name, hook);
        self
    }

    /// Register a function made of several chained hooks.
    pub fn function_chain(mut self, name: &str, chain: Vec<FunctionHook<TxContext>>) -> Self {
        self.functions.set_policy(name, chain);
        self
    }

    /// Never inline the reference at dotted `path` of `asset` while resolving.
    pub fn field_blacklist(mut self, asset: &str, path: &str) -> Self {
        self.field_blacklist
            .push((asset.to_lowercase(), path.to_string()));
        self
    }

    pub fn build(self) -> Configuration {
        let mut resolve = ResolveRules {
            recursive_whitelist: self
                .settings
                .recursive_resolve_whitelist
                .iter()
                .cloned()
                .collect(),
            blacklist: self.settings.resolve_blacklist.iter().cloned().collect(),
            ..Default::default()
        };
        for (asset, path) in self.field_blacklist {
            resolve
                .field_blacklist
                .entry(asset)
                .or_insert_with(HashSet::new)
                .insert(path);
        }

        Configuration {
            business: self.business,
            functions: self.functions,
            resolve,
            id_func: self.settings.id_func,
            previous_id_func: self.settings.previous_id_func,
            page_size: self.settings.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = EngineSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.page_size, 10);
        assert_eq!(settings.id_func, IdFunc::Sha512);
    }

    #[test]
    fn lists_are_trimmed_and_lowercased() {
        let settings = EngineSettings::from_lookup(lookup(&[
            ("LEDGERDOC_RESOLVE_BLACKLIST", " User, ,mockblacklisted"),
            ("LEDGERDOC_RECURSIVE_RESOLVE_WHITELIST", "mocklevel1.level2"),
            ("LEDGERDOC_PREVIOUS_ID_FUNC", "sha256"),
        ]))
        .unwrap();
        assert_eq!(settings.resolve_blacklist, vec!["user", "mockblacklisted"]);
        assert_eq!(settings.recursive_resolve_whitelist, vec!["mocklevel1.level2"]);
        assert_eq!(settings.previous_id_func, Some(IdFunc::Sha256));
    }

    #[test]
    fn invalid_page_size_rejects() {
        assert!(EngineSettings::from_lookup(lookup(&[("LEDGERDOC_PAGE_SIZE", "0")])).is_err());
        assert!(EngineSettings::from_lookup(lookup(&[("LEDGERDOC_PAGE_SIZE", "ten")])).is_err());
    }

    #[test]
    fn builder_registers_builtin_functions() {
        let config = ConfigurationBuilder::new(EngineSettings::default())
            .field_blacklist("MockReffieldblacklist", "ref")
            .build();
        for name in ["identityAccess", "myAccess", "upsertRegistries", "upsertSingletons"] {
            assert!(config.functions.contains(name), "{name} missing");
        }
        assert!(config
            .resolve
            .is_field_blacklisted("mockreffieldblacklist", &["ref".to_string()]));
    }
}
