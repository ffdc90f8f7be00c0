// ── JSON tree visitor ──
//
// The groups payload has no stable schema; identifiers are pulled out of it
// by walking the whole tree. Everything here is pure so tests can feed
// synthetic trees.

use indexmap::IndexSet;
use serde_json::Value;
use uuid::Uuid;

/// Depth-first visit of every node. The callback receives the object key
/// under which the node sits (`None` for the root and array elements).
pub fn walk<'a, F>(value: &'a Value, visit: &mut F)
where
    F: FnMut(Option<&'a str>, &'a Value),
{
    walk_inner(None, value, visit);
}

fn walk_inner<'a, F>(key: Option<&'a str>, value: &'a Value, visit: &mut F)
where
    F: FnMut(Option<&'a str>, &'a Value),
{
    visit(key, value);
    match value {
        Value::Array(items) => {
            for item in items {
                walk_inner(None, item, visit);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                walk_inner(Some(k.as_str()), v, visit);
            }
        }
        _ => {}
    }
}

/// Whether `s` is a hyphenated UUID (any version).
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::try_parse(s).is_ok()
}

/// Every UUID-shaped string in the tree, de-duplicated in first-seen order.
pub fn collect_uuids(value: &Value) -> IndexSet<String> {
    let mut out = IndexSet::new();
    walk(value, &mut |_, node| {
        if let Some(s) = node.as_str().filter(|s| is_uuid(s)) {
            out.insert(s.to_owned());
        }
    });
    out
}

/// Identifiers listed under any `devices[].id`, at any depth.
pub fn collect_device_ids(value: &Value) -> IndexSet<String> {
    let mut out = IndexSet::new();
    walk(value, &mut |key, node| {
        if key != Some("devices") {
            return;
        }
        let Some(devices) = node.as_array() else {
            return;
        };
        for id in devices
            .iter()
            .filter_map(|d| d.get("id").and_then(Value::as_str))
        {
            out.insert(id.to_owned());
        }
    });
    out
}

/// UUID-shaped string values stored directly under one of `keys` on any
/// object in the tree, in document order.
pub fn collect_uuids_under_keys(value: &Value, keys: &[&str]) -> IndexSet<String> {
    let mut out = IndexSet::new();
    walk(value, &mut |key, node| {
        let Some(key) = key else { return };
        if !keys.contains(&key) {
            return;
        }
        if let Some(s) = node.as_str().filter(|s| is_uuid(s)) {
            out.insert(s.to_owned());
        }
    });
    out
}

/// Values of top-level group keys naming a creator (`mobile_group_creator`
/// and anything else containing "creator"), for each group in a list.
pub fn collect_creator_ids(groups: &[Value]) -> IndexSet<String> {
    groups
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|group| group.iter())
        .filter(|(k, _)| k.contains("creator"))
        .filter_map(|(_, v)| v.as_str())
        .map(String::from)
        .collect()
}
