use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::attributes::AttributeMap;

/// A single attribute-level difference.
///
/// `None` means the attribute was absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub attribute: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// The ordered result of diffing two attribute maps, sorted by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    pub changes: Vec<AttributeChange>,
}

impl ChangeSet {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeChange> {
        self.changes.iter()
    }

    /// Look up the change for one attribute.
    pub fn get(&self, attribute: &str) -> Option<&AttributeChange> {
        self.changes
            .binary_search_by(|c| c.attribute.as_str().cmp(attribute))
            .ok()
            .map(|i| &self.changes[i])
    }

    /// Serialize the change set to a JSON value.
    ///
    /// Absent sides are omitted rather than written as `null`, so a reader
    /// can tell "added" from "set to null".
    pub fn to_json(&self) -> Value {
        let changes: Vec<Value> = self
            .changes
            .iter()
            .map(|c| {
                let mut entry = serde_json::Map::new();
                entry.insert("attribute".to_string(), Value::String(c.attribute.clone()));
                if let Some(before) = &c.before {
                    entry.insert("before".to_string(), before.clone());
                }
                if let Some(after) = &c.after {
                    entry.insert("after".to_string(), after.clone());
                }
                Value::Object(entry)
            })
            .collect();
        Value::Array(changes)
    }

    /// Format the change set as human-readable lines.
    ///
    /// `+` marks an added attribute, `-` a removed one, `~` a changed one.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        for c in &self.changes {
            let line = match (&c.before, &c.after) {
                (None, Some(after)) => format!("+ {}: {}", c.attribute, render(after)),
                (Some(before), None) => format!("- {}: {}", c.attribute, render(before)),
                (Some(before), Some(after)) => {
                    format!("~ {}: {} -> {}", c.attribute, render(before), render(after))
                }
                (None, None) => continue,
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a AttributeChange;
    type IntoIter = std::slice::Iter<'a, AttributeChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Compute the attribute-level difference between two attribute maps.
///
/// Every attribute present in either map whose values differ (structural
/// equality) is reported, except those named in `ignored`. Output is sorted
/// by attribute name, so equal inputs always produce identical output.
pub fn diff(before: &AttributeMap, after: &AttributeMap, ignored: &BTreeSet<String>) -> ChangeSet {
    // Both maps are BTreeMaps, so the union of their keys is already sorted.
    let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    let changes = names
        .into_iter()
        .filter(|name| !ignored.contains(name.as_str()))
        .filter_map(|name| {
            let old = before.get(name);
            let new = after.get(name);
            if old == new {
                return None;
            }
            Some(AttributeChange {
                attribute: name.clone(),
                before: old.cloned(),
                after: new.cloned(),
            })
        })
        .collect();

    ChangeSet { changes }
}
