//! Reference detection rules.
//!
//! A string leaf of an asset is a reference when the schema node describing
//! it carries a description starting with `REF-><name>` (the leaf holds the
//! target id) or `ENTITYREF` (the leaf holds `<name>:<id>`). This module
//! holds the pure parts of reference handling: mapping data paths to schema
//! pointers, parsing descriptions, and the resolve white/blacklists.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;
use crate::keys::{ENTITY_REF_PREFIX, REF_PREFIX};

/// Target of a reference leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Lower-case document name of the target.
    pub name: String,
    /// Lower-case id of the target.
    pub id: String,
}

/// Schema pointer of the `description` of the node at `path`.
///
/// Array indices map to `items`, except a trailing index which maps to the
/// array node itself; object keys map to `properties/<key>`.
pub fn description_pointer(path: &[String]) -> String {
    let mut pointer = String::new();
    for (i, segment) in path.iter().enumerate() {
        if segment.parse::<usize>().is_ok() {
            if i == path.len() - 1 {
                break;
            }
            pointer.push_str("/items");
        } else {
            pointer.push_str("/properties/");
            pointer.push_str(&escape_pointer_token(segment));
        }
    }
    pointer.push_str("/description");
    pointer
}

/// JSON pointer of a data path.
pub fn data_pointer(path: &[String]) -> String {
    path.iter()
        .map(|segment| format!("/{}", escape_pointer_token(segment)))
        .collect()
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Parse a schema description and the leaf value it describes.
///
/// Returns `None` when the description does not mark a reference. A
/// malformed entity reference is a hard error.
pub fn analyze_ref(description: &str, value: &str) -> Result<Option<Reference>, CoreError> {
    if let Some(rest) = description.strip_prefix(REF_PREFIX) {
        let name = rest.split(' ').next().unwrap_or_default();
        return Ok(Some(Reference {
            name: name.to_lowercase(),
            id: value.to_lowercase(),
        }));
    }

    if description.starts_with(ENTITY_REF_PREFIX) {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() != 2 {
            return Err(CoreError::UnprocessableEntity(format!(
                "invalid \"entity\" format: {value}, it must follow schema: <name>:<uuid>"
            )));
        }
        return Ok(Some(Reference {
            name: parts[0].to_lowercase(),
            id: parts[1].to_lowercase(),
        }));
    }

    Ok(None)
}

// ---------------------------------------------------------------------------
// ResolveRules
// ---------------------------------------------------------------------------

/// Which references are followed, and how deep, while resolving.
#[derive(Debug, Clone, Default)]
pub struct ResolveRules {
    /// `"<asset>.<field>"` entries allowing recursion into the target.
    pub recursive_whitelist: HashSet<String>,
    /// Target names never validated nor resolved.
    pub blacklist: HashSet<String>,
    /// Per-asset dotted data paths skipped while resolving.
    pub field_blacklist: HashMap<String, HashSet<String>>,
}

impl ResolveRules {
    pub fn is_blacklisted(&self, target: &str) -> bool {
        self.blacklist.contains(target)
    }

    /// Whether `path`, or any object above it, is blacklisted for `asset`.
    pub fn is_field_blacklisted(&self, asset: &str, path: &[String]) -> bool {
        let Some(fields) = self.field_blacklist.get(asset) else {
            return false;
        };
        (1..=path.len()).any(|len| fields.contains(&path[..len].join(".")))
    }

    /// Whether resolving `asset.field` should recurse into `target`.
    ///
    /// Never recurses into the same document type.
    pub fn should_recurse(&self, asset: &str, field: &str, target: &str) -> bool {
        if asset == target {
            return false;
        }
        if self.recursive_whitelist.contains(&format!("{asset}.{field}")) {
            return true;
        }
        let prefix = format!("{target}.");
        self.recursive_whitelist
            .iter()
            .any(|entry| entry.starts_with(&prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    // -- pointers --------------------------------------------------------

    #[test]
    fn pointer_for_nested_array_item_field() {
        assert_eq!(
            description_pointer(&path(&["expenses", "0", "user"])),
            "/properties/expenses/items/properties/user/description"
        );
    }

    #[test]
    fn trailing_index_points_at_array() {
        assert_eq!(
            description_pointer(&path(&["roles", "3"])),
            "/properties/roles/description"
        );
    }

    #[test]
    fn data_pointer_escapes_tokens() {
        assert_eq!(data_pointer(&path(&["a/b", "0", "c~d"])), "/a~1b/0/c~0d");
    }

    // -- analyze_ref -----------------------------------------------------

    #[test]
    fn ref_name_ends_at_first_space() {
        let found = analyze_ref("REF->MOCKUSER assigned user", "ABC").unwrap();
        assert_eq!(
            found,
            Some(Reference {
                name: "mockuser".into(),
                id: "abc".into()
            })
        );
    }

    #[test]
    fn plain_description_is_not_a_reference() {
        assert_eq!(analyze_ref("Just text", "abc").unwrap(), None);
    }

    #[test]
    fn entity_reference_parsed() {
        let found = analyze_ref("ENTITYREF", "MockIncident:1234").unwrap().unwrap();
        assert_eq!(found.name, "mockincident");
        assert_eq!(found.id, "1234");
    }

    #[test]
    fn malformed_entity_reference_rejects() {
        let err = analyze_ref("ENTITYREF", "nocolon").unwrap_err();
        assert_matches!(err, CoreError::UnprocessableEntity(_));
        assert!(analyze_ref("ENTITYREF", "a:b:c").is_err());
    }

    // -- rules -----------------------------------------------------------

    #[test]
    fn recursion_requires_whitelist_and_distinct_types() {
        let rules = ResolveRules {
            recursive_whitelist: ["mocklevel1.level2".to_string(), "mocklevel2.level3".to_string()]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        assert!(rules.should_recurse("mocklevel1", "level2", "mocklevel2"));
        assert!(!rules.should_recurse("mocklevel2", "level3", "mocklevel2"));
        assert!(!rules.should_recurse("mocklevel3", "other", "mocklevel4"));
        // a target that itself has whitelisted fields is recursed into
        assert!(rules.should_recurse("mockother", "link", "mocklevel1"));
    }

    #[test]
    fn field_blacklist_uses_dotted_path() {
        let mut rules = ResolveRules::default();
        rules.field_blacklist.insert(
            "mockreffieldblacklist".into(),
            ["nested.blacklisted_nest".to_string()].into_iter().collect(),
        );
        assert!(rules.is_field_blacklisted("mockreffieldblacklist", &path(&["nested", "blacklisted_nest"])));
        assert!(!rules.is_field_blacklisted("mockreffieldblacklist", &path(&["nested"])));
    }

    #[test]
    fn field_blacklist_covers_subtree() {
        let mut rules = ResolveRules::default();
        rules
            .field_blacklist
            .insert("mockreffieldblacklist".into(), ["nested".to_string()].into_iter().collect());
        assert!(rules.is_field_blacklisted("mockreffieldblacklist", &path(&["nested"])));
        assert!(rules.is_field_blacklisted("mockreffieldblacklist", &path(&["nested", "inner"])));
        assert!(!rules.is_field_blacklisted("mockreffieldblacklist", &path(&["nestedother"])));
        assert!(!rules.is_field_blacklisted("mockincident", &path(&["nested", "inner"])));
    }
}
