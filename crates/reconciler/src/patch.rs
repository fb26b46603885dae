//! Patch synthesizer: turns a desired/current pair into a minimal mutation.

use serde_json::{Map, Value};
use shelfsync_core::value::is_blank;
use shelfsync_template::VARIANTS_KEY;

use crate::compare::diff_field;
use crate::error::{Error, Result};
use crate::types::DestinationRecord;

/// Key carrying the destination id in every patch.
pub const ID_KEY: &str = "id";

/// Build the minimal patch moving `current` towards `desired`.
///
/// `destination` is the unfiltered record; it supplies the real variant ids
/// the filtered `current` document no longer carries. Blank desired values
/// never produce a patch entry: an empty source field means "leave as is".
///
/// Returns `Ok(None)` when nothing needs to change.
///
/// # Errors
///
/// Returns `Error::VariantMatch` when a desired variant with changes has no
/// locatable destination counterpart or that counterpart has no id.
pub fn synthesize(
    desired: &Value,
    current: &Value,
    destination: &DestinationRecord,
) -> Result<Option<Value>> {
    let mut patch = Map::new();
    patch.insert(ID_KEY.to_string(), Value::String(destination.id.clone()));

    let header = changed_fields(desired, current, |key| key == VARIANTS_KEY || key == ID_KEY);
    let header_changed = !header.is_empty();
    patch.extend(header);

    let variants = variant_patches(desired, current, destination)?;
    let variants_changed = !variants.is_empty();
    if variants_changed {
        patch.insert(VARIANTS_KEY.to_string(), Value::Array(variants));
    }

    if header_changed || variants_changed {
        Ok(Some(Value::Object(patch)))
    } else {
        Ok(None)
    }
}

fn changed_fields(
    desired: &Value,
    current: &Value,
    skip: impl Fn(&str) -> bool,
) -> Map<String, Value> {
    let Some(want) = desired.as_object() else {
        return Map::new();
    };
    want.iter()
        .filter(|(key, _)| !skip(key))
        .filter(|(_, value)| !is_blank(value))
        .filter(|(key, value)| {
            let have = current.get(key.as_str()).unwrap_or(&Value::Null);
            !diff_field(key, value, have).is_empty()
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn variant_patches(
    desired: &Value,
    current: &Value,
    destination: &DestinationRecord,
) -> Result<Vec<Value>> {
    let Some(wanted) = desired.get(VARIANTS_KEY).and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let current_variants = current
        .get(VARIANTS_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut patches = Vec::new();
    for (index, want) in wanted.iter().enumerate() {
        let sku = want.get("sku").and_then(Value::as_str).filter(|s| !s.is_empty());
        let matched = sku
            .and_then(|sku| destination.variant_index_by_sku(sku))
            .or_else(|| (index < destination.variants.len()).then_some(index));

        let have = matched
            .and_then(|i| current_variants.get(i))
            .unwrap_or(&Value::Null);
        let changes = changed_fields(want, have, |key| key == ID_KEY);
        if changes.is_empty() {
            continue;
        }

        let label = sku.map_or_else(|| format!("#{index}"), |sku| format!("'{sku}'"));
        let variant = matched
            .and_then(|i| destination.variants.get(i))
            .ok_or_else(|| {
                Error::variant_match(
                    &destination.id,
                    format!("desired variant {label} has no destination counterpart"),
                )
            })?;
        let variant_id = variant.id.clone().ok_or_else(|| {
            Error::variant_match(
                &destination.id,
                format!("destination variant {label} has no id"),
            )
        })?;

        let mut entry = Map::new();
        entry.insert(ID_KEY.to_string(), Value::String(variant_id));
        entry.extend(changes);
        patches.push(Value::Object(entry));
    }
    Ok(patches)
}
