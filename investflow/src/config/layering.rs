//! Deep merge of layered YAML documents.

use serde_yaml::Value;

/// Merges `overlay` into `base`.
///
/// Mappings merge key by key, recursively. Any other overlay value,
/// sequences included, replaces the base value outright.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
