use serde_json::Value;

use super::{Cell, TabularTable};

/// Normalize search hits into a table with one column per requested field.
///
/// Values come from each hit's `_source`, falling back to the `fields`
/// section. Dotted names address nested objects; single-element arrays are
/// unwrapped.
pub fn from_search_hits(hits: &[Value], fields: &[String]) -> TabularTable {
    let rows = hits
        .iter()
        .map(|hit| {
            fields
                .iter()
                .map(|field| lookup_hit_field(hit, field).map(cell_for).unwrap_or(Cell::Empty))
                .collect()
        })
        .collect();
    TabularTable {
        columns: fields.to_vec(),
        rows,
    }
}

fn lookup_hit_field<'a>(hit: &'a Value, field: &str) -> Option<&'a Value> {
    hit.get("_source")
        .and_then(|source| lookup_path(source, field))
        .or_else(|| hit.get("fields").and_then(|fields| fields.get(field)))
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(found) = value.get(path) {
        return Some(found);
    }
    let (head, rest) = path.split_once('.')?;
    lookup_path(value.get(head)?, rest)
}

fn cell_for(value: &Value) -> Cell {
    match value {
        Value::Array(items) if items.len() == 1 => Cell::from_json(&items[0]),
        other => Cell::from_json(other),
    }
}
