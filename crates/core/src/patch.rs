//! JSON Merge Patch (RFC 7396).

use serde_json::Value;

use crate::asset::Object;

/// Apply `patch` onto `target` in place.
///
/// `null` members remove keys, objects merge recursively, every other value
/// replaces the target member.
pub fn merge_patch(target: &mut Object, patch: &Object) {
    for (key, value) in patch {
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(inner) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Object::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Object::new());
                }
                if let Value::Object(existing) = slot {
                    merge_patch(existing, inner);
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}
