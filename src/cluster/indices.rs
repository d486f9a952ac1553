//! Index discovery, field mappings and search.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::client::{ClusterClient, TransportError};

/// Index-pattern/field discovery and search boundary used by query mode.
pub trait QueryApi: Send + Sync {
    /// Visible index names, sorted.
    fn index_patterns(&self) -> Result<Vec<String>, TransportError>;

    /// Leaf fields mapped under `index`, sorted by name.
    fn fields(&self, index: &str) -> Result<Vec<IndexField>, TransportError>;

    /// Run a search and return its raw hits.
    fn search(&self, request: &SearchRequest) -> Result<Vec<Value>, TransportError>;
}

/// One leaf field from an index mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexField {
    pub name: String,
    /// Mapping type such as `float` or `keyword`.
    pub field_type: String,
}

impl IndexField {
    /// Field can feed a numeric training input.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.field_type.as_str(),
            "long"
                | "integer"
                | "short"
                | "byte"
                | "double"
                | "float"
                | "half_float"
                | "scaled_float"
                | "unsigned_long"
        )
    }
}

/// A `_search` call over one or more index patterns.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    pub fields: Vec<String>,
    pub query: Option<Value>,
    /// Maximum hits to return.
    pub size: usize,
}

impl SearchRequest {
    fn body(&self) -> Value {
        json!({
            "_source": self.fields,
            "size": self.size,
            "query": self.query.clone().unwrap_or_else(|| json!({"match_all": {}})),
        })
    }
}

#[derive(Deserialize)]
struct CatIndex {
    index: String,
}

#[derive(Deserialize)]
struct SearchWire {
    hits: HitsWire,
}

#[derive(Deserialize)]
struct HitsWire {
    #[serde(default)]
    hits: Vec<Value>,
}

impl QueryApi for ClusterClient {
    fn index_patterns(&self) -> Result<Vec<String>, TransportError> {
        let url = self.url_for(&["_cat", "indices"], &[("format", "json")])?;
        let rows: Vec<CatIndex> = self.get_json(&url)?;
        let mut names: Vec<String> = rows
            .into_iter()
            .map(|row| row.index)
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn fields(&self, index: &str) -> Result<Vec<IndexField>, TransportError> {
        let url = self.url_for(&[index, "_mapping"], &[])?;
        let mapping: Map<String, Value> = self.get_json(&url)?;
        Ok(flatten_mapping(&mapping))
    }

    fn search(&self, request: &SearchRequest) -> Result<Vec<Value>, TransportError> {
        if request.indices.is_empty() {
            return Ok(Vec::new());
        }
        let target = request.indices.join(",");
        let url = self.url_for(&[target.as_str(), "_search"], &[])?;
        let response: SearchWire = self.post_json(&url, &request.body())?;
        Ok(response.hits.hits)
    }
}

/// Flatten a `_mapping` response (possibly spanning several indices) into
/// dotted leaf field names. Conflicting types keep the first one seen.
pub fn flatten_mapping(mapping: &Map<String, Value>) -> Vec<IndexField> {
    let mut fields = Vec::new();
    for index_mapping in mapping.values() {
        if let Some(properties) = index_mapping
            .get("mappings")
            .and_then(|mappings| mappings.get("properties"))
            .and_then(Value::as_object)
        {
            collect_properties(properties, "", &mut fields);
        }
    }
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields.dedup_by(|later, earlier| later.name == earlier.name);
    fields
}

fn collect_properties(properties: &Map<String, Value>, prefix: &str, out: &mut Vec<IndexField>) {
    for (name, definition) in properties {
        let full_name = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        if let Some(nested) = definition.get("properties").and_then(Value::as_object) {
            collect_properties(nested, &full_name, out);
            continue;
        }
        let field_type = definition
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("object")
            .to_string();
        out.push(IndexField {
            name: full_name,
            field_type,
        });
    }
}
