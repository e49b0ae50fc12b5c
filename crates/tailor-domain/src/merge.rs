//! Structural merge of index documents.

use serde_json::map::Entry;
use serde_json::{Map, Value};

use crate::index::IndexDocument;

/// Two documents disagree on a scalar leaf.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[TI110] conflict at {path}")]
pub struct MergeConflict {
    path: String,
}

impl MergeConflict {
    fn at(stack: &[String], key: &str) -> Self {
        let mut segments: Vec<&str> = stack.iter().map(String::as_str).collect();
        segments.push(key);
        Self {
            path: segments.join("."),
        }
    }

    /// Dotted key sequence leading to the divergent leaf.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Merges `incoming` into `base`.
///
/// Keys missing from `base` are copied over, nested mappings are merged
/// recursively and equal scalars are kept. The first pair of differing leaves
/// (including a mapping facing a scalar) aborts the merge; `base` is consumed
/// either way so a half-merged document never escapes.
pub fn merge_documents(
    mut base: IndexDocument,
    incoming: &IndexDocument,
) -> Result<IndexDocument, MergeConflict> {
    let mut stack = Vec::new();
    merge_maps(base.as_map_mut(), incoming.as_map(), &mut stack)?;
    Ok(base)
}

fn merge_maps(
    base: &mut Map<String, Value>,
    incoming: &Map<String, Value>,
    stack: &mut Vec<String>,
) -> Result<(), MergeConflict> {
    for (key, value) in incoming {
        match base.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(value.clone());
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                (Value::Object(existing), Value::Object(nested)) => {
                    stack.push(key.clone());
                    merge_maps(existing, nested, stack)?;
                    stack.pop();
                }
                (existing, value) if *existing == *value => {}
                _ => return Err(MergeConflict::at(stack, key)),
            },
        }
    }
    Ok(())
}
