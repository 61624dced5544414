//! Shallow field-merge helpers shared by both family adapters.
//!
//! Merges operate on the serialised form of a node so that unmodelled
//! provider fields (held in the flattened `extra` maps) participate exactly
//! like modelled ones. A merge that produces a value the node type can no
//! longer represent leaves the target untouched and surfaces an error, which
//! the batch loop turns into a logged skip.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::ApplyError;

/// Merges `fields` into `target`'s serialised form, skipping `excluded`
/// keys. Incoming values carrying a `nodes` array refill the existing
/// array wholesale; anything else overwrites the key.
pub(crate) fn merge_fields<T>(
    target: &mut T,
    fields: &Map<String, Value>,
    excluded: &[&str],
) -> Result<(), ApplyError>
where
    T: Serialize + DeserializeOwned,
{
    let mut serialised =
        serde_json::to_value(&*target).map_err(|error| ApplyError::Serialisation {
            message: error.to_string(),
        })?;

    let Value::Object(object) = &mut serialised else {
        return Err(ApplyError::Serialisation {
            message: "merge target did not serialise to an object".to_owned(),
        });
    };

    for (key, incoming) in fields {
        if excluded.contains(&key.as_str()) {
            continue;
        }
        merge_key(object, key, incoming);
    }

    let merged: T = serde_json::from_value(serialised).map_err(|error| ApplyError::InvalidMerge {
        message: error.to_string(),
    })?;
    *target = merged;
    Ok(())
}

fn merge_key(object: &mut Map<String, Value>, key: &str, incoming: &Value) {
    if let Some(incoming_nodes) = nodes_array(incoming)
        && let Some(existing) = object.get_mut(key)
        && let Some(Value::Array(existing_nodes)) =
            existing.as_object_mut().and_then(|entry| entry.get_mut("nodes"))
    {
        existing_nodes.clear();
        existing_nodes.extend(incoming_nodes.iter().cloned());
        return;
    }
    object.insert(key.to_owned(), incoming.clone());
}

fn nodes_array(value: &Value) -> Option<&Vec<Value>> {
    value
        .as_object()
        .and_then(|object| object.get("nodes"))
        .and_then(Value::as_array)
}
