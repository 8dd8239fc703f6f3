// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Merge logic for layering configuration trees on top of each other.

use serde_yaml::{Mapping, Value};

#[cfg(test)]
#[path = "./merge_test.rs"]
mod merge_test;

/// Merge `overlay` on top of `base`.
///
/// - a non-mapping overlay replaces the base entirely
/// - a mapping overlay is applied key by key, recursing only where both
///   sides hold a mapping for the same key
/// - sequences are never merged element-wise
///
/// Keys keep the position they first appeared at; new keys are appended.
pub fn merge_values(base: Value, overlay: &Value) -> Value {
    let Value::Mapping(overlay_map) = overlay else {
        return overlay.clone();
    };

    let mut merged = match base {
        Value::Mapping(map) => map,
        _ => Mapping::new(),
    };

    for (key, value) in overlay_map {
        let recurse = value.is_mapping() && merged.get(key).is_some_and(Value::is_mapping);
        if recurse {
            if let Some(existing) = merged.get_mut(key) {
                let taken = std::mem::replace(existing, Value::Null);
                *existing = merge_values(taken, value);
            }
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    Value::Mapping(merged)
}

/// Merge `overlay` into `target` in place.
pub fn merge_into(target: &mut Value, overlay: &Value) {
    let base = std::mem::replace(target, Value::Null);
    *target = merge_values(base, overlay);
}

/// Fold a sequence of layers left to right, later layers winning.
///
/// Layers are processed in order, starting from an empty mapping. This is
/// the precedence chain used for every package instance:
/// defaults, then the named override, then the instance itself.
pub fn compose_layers<'a, I>(layers: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    layers
        .into_iter()
        .fold(Value::Mapping(Mapping::new()), merge_values)
}
