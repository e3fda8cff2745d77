//! Request-scoped role-based access enforcer.
//!
//! Policies are built per request from the caller's resolved identity (role
//! grants) and from the per-asset overrides of whatever asset is being
//! checked. A request is granted when at least one matching rule allows it
//! and no matching rule denies it. Holders of the superuser role are granted
//! unconditionally.
//!
//! Rule objects are matched with [`key_match`]: a `*` in the pattern matches
//! any suffix starting at its position.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::asset::{id_key, AssetExt, Object};
use crate::error::CoreError;
use crate::keys::{
    ACTION_KEY, EFFECT_KEY, FINGERPRINT_KEY, GRANTS_KEY, IDENTITY_ASSET, IS_ENABLED_KEY,
    OBJECT_KEY, OVERRIDES_KEY, ROLES_KEY, SUBJECT_KEY, SUPERUSER_ROLE_ID, UUID_KEY,
};

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    /// Case-insensitive; `None` for anything but allow or deny.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of a single permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied(String),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Turn a denial into a `Forbidden` error.
    pub fn into_result(self) -> Result<(), CoreError> {
        match self {
            Self::Granted => Ok(()),
            Self::Denied(reason) => Err(CoreError::Forbidden(reason)),
        }
    }
}

// ---------------------------------------------------------------------------
// AccessEnforcer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Rule {
    subject: String,
    object: String,
    action: String,
    effect: Effect,
}

#[derive(Debug, Default)]
pub struct AccessEnforcer {
    links: HashMap<String, BTreeSet<String>>,
    rules: Vec<Rule>,
}

impl AccessEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `subject` a member of `role`.
    pub fn add_role_link(&mut self, subject: &str, role: &str) {
        self.links
            .entry(subject.to_string())
            .or_default()
            .insert(role.to_string());
    }

    pub fn add_rule(&mut self, subject: &str, object: &str, action: &str, effect: Effect) {
        self.rules.push(Rule {
            subject: subject.to_string(),
            object: object.to_string(),
            action: action.to_string(),
            effect,
        });
    }

    /// Load role links and grants from an identity whose roles are resolved.
    ///
    /// Fails when the identity is disabled.
    pub fn load_roles(&mut self, identity: &Object) -> Result<(), CoreError> {
        let subject = identity.str_field(FINGERPRINT_KEY)?.to_string();
        if !identity.bool_field(IS_ENABLED_KEY)? {
            return Err(CoreError::Forbidden(format!(
                "current identity: {subject} is not enabled"
            )));
        }

        let roles = match identity.get(ROLES_KEY) {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Array(roles)) => roles,
            Some(_) => return Err(CoreError::BadRequest(format!("key '{ROLES_KEY}' is not an array"))),
        };

        for role in roles {
            let role = role.as_object().ok_or_else(|| {
                CoreError::Internal("identity roles must be resolved before loading".into())
            })?;
            let role_id = role.str_field(UUID_KEY)?;
            self.add_role_link(&subject, role_id);

            for grant in object_list(role, GRANTS_KEY)? {
                let object = grant.str_field(OBJECT_KEY)?;
                let action = grant.str_field(ACTION_KEY)?;
                self.add_rule(role_id, object, action, Effect::Allow);
            }
        }
        Ok(())
    }

    /// Load the per-instance overrides of `asset`.
    pub fn load_overrides(&mut self, asset: &Object) -> Result<(), CoreError> {
        if !asset.contains_key(OVERRIDES_KEY) {
            return Ok(());
        }
        let object = asset.permission_object()?;
        for rule in object_list(asset, OVERRIDES_KEY)? {
            let subject = rule.str_field(SUBJECT_KEY)?.to_lowercase();
            let action = rule.str_field(ACTION_KEY)?.to_lowercase();
            let raw = rule.str_field(EFFECT_KEY)?;
            let Some(effect) = Effect::parse(raw) else {
                tracing::debug!(object = %object, effect = raw, "override with unknown effect skipped");
                continue;
            };
            self.add_rule(&subject, &object, &action, effect);
        }
        Ok(())
    }

    pub fn is_superuser(&self, subject: &str) -> bool {
        subject == SUPERUSER_ROLE_ID
            || self
                .links
                .get(subject)
                .is_some_and(|roles| roles.contains(SUPERUSER_ROLE_ID))
    }

    fn has_role(&self, subject: &str, role: &str) -> bool {
        subject == role
            || self
                .links
                .get(subject)
                .is_some_and(|roles| roles.contains(role))
    }

    /// Evaluate the loaded rules for one exact object string.
    fn evaluate(&self, subject: &str, object: &str, action: &str) -> bool {
        if self.is_superuser(subject) {
            return true;
        }
        let mut allowed = false;
        for rule in &self.rules {
            if rule.action != action
                || !self.has_role(subject, &rule.subject)
                || !key_match(object, &rule.object)
            {
                continue;
            }
            match rule.effect {
                Effect::Deny => return false,
                Effect::Allow => allowed = true,
            }
        }
        allowed
    }

    /// Check `action` on `object`, loading the overrides of `asset` first.
    ///
    /// The object is tried as given and then lower-cased.
    pub fn enforce_custom(
        &mut self,
        object: &str,
        subject: &str,
        action: &str,
        asset: Option<&Object>,
    ) -> Result<Decision, CoreError> {
        let action = action.to_lowercase();
        if let Some(asset) = asset {
            self.load_overrides(asset)?;
        }

        if self.evaluate(subject, object, &action)
            || self.evaluate(subject, &object.to_lowercase(), &action)
        {
            return Ok(Decision::Granted);
        }

        tracing::debug!(subject, object, action = %action, "permission denied");
        Ok(Decision::Denied(format!(
            "permission denied, sub: {subject}, obj: {object}, act: {action}"
        )))
    }

    /// Check `action` on a stored asset, honouring its overrides.
    pub fn enforce_asset(
        &mut self,
        asset: &Object,
        subject: &str,
        action: &str,
    ) -> Result<Decision, CoreError> {
        let object = asset.permission_object()?;
        self.enforce_custom(&object, subject, action, Some(asset))
    }

    /// Replace assets `subject` may not `action` with an error placeholder.
    ///
    /// Output has the same length and order as the input. A subject's own
    /// identity always passes.
    pub fn filter_assets(
        &mut self,
        assets: Vec<Object>,
        subject: &str,
        action: &str,
    ) -> Result<Vec<Object>, CoreError> {
        let mut output = Vec::with_capacity(assets.len());
        for asset in assets {
            let name = asset.doc_type()?;
            let id = asset.asset_id()?;
            if name == IDENTITY_ASSET && id == subject {
                output.push(asset);
                continue;
            }

            match self.enforce_asset(&asset, subject, action)? {
                Decision::Granted => output.push(asset),
                Decision::Denied(reason) => {
                    let mut placeholder = Object::new();
                    placeholder.insert(id_key(&name).into(), Value::String(id));
                    placeholder.insert("error".into(), Value::String(reason));
                    output.push(placeholder);
                }
            }
        }
        Ok(output)
    }
}

fn object_list<'a>(source: &'a Object, key: &str) -> Result<Vec<&'a Object>, CoreError> {
    match source.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| CoreError::BadRequest(format!("key '{key}' must contain objects")))
            })
            .collect(),
        Some(_) => Err(CoreError::BadRequest(format!("key '{key}' is not an array"))),
    }
}

/// Pattern match of a permission object.
///
/// Without `*` the strings must be equal. With `*` at index `i`, the key
/// must share the first `i` bytes of the pattern; a key of exactly `i`
/// bytes must equal that prefix.
pub fn key_match(key: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        None => key == pattern,
        Some(i) => {
            if key.len() > i {
                key.as_bytes()[..i] == pattern.as_bytes()[..i]
            } else {
                key == &pattern[..i]
            }
        }
    }
}
