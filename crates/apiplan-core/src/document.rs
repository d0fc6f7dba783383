//! API document model: schema graph, operations and base URL
//!
//! Accepts OpenAPI 3 (`components/schemas`, `servers`) and Swagger 2
//! (`definitions`, `host` + `basePath`) documents, in JSON or YAML.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ErrorKind;
use crate::schema::{SchemaGraph, SchemaId};

const METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

/// Response codes whose schema is used for ingestion, in order of preference.
const RESPONSE_CODES: [&str; 3] = ["200", "201", "default"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    FormData,
}

impl ParamLocation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "body" => Some(Self::Body),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }
}

/// Declared operation parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: SchemaId,
}

/// One `(path, method)` pair of the document.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Upper-case HTTP method
    pub method: String,
    pub path: String,
    pub parameters: Vec<Parameter>,
    /// JSON schema of the 200 / 201 / default response
    pub response_schema: Option<SchemaId>,
}

/// Parsed API document.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    graph: Arc<SchemaGraph>,
    operations: Vec<Operation>,
    base_url: Option<String>,
}

impl ApiDocument {
    /// Read and parse a document file.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Io`] if the file cannot be read and
    /// [`DocumentError::Parse`] if it is not a JSON / YAML object.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DocumentError::Io(format!("{}: {e}", path.display())))?;
        let spec = parse_spec(path, &content)?;
        Self::from_value(&spec)
    }

    /// Build the model from an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] if the root is not an object.
    pub fn from_value(spec: &Value) -> Result<Self, DocumentError> {
        if !spec.is_object() {
            return Err(DocumentError::Parse(
                "document root is not an object".to_string(),
            ));
        }

        let mut graph = SchemaGraph::new();
        for pointer in ["/definitions", "/components/schemas"] {
            if let Some(defs) = spec.pointer(pointer).and_then(Value::as_object) {
                for (name, schema) in defs {
                    graph.define(name, schema);
                }
            }
        }

        let mut operations = Vec::new();
        if let Some(paths) = spec.get("paths").and_then(Value::as_object) {
            for (path, item) in paths {
                for method in METHODS {
                    let Some(op) = item.get(method) else {
                        continue;
                    };
                    let mut parameters: Vec<Parameter> = Vec::new();
                    for source in [item.get("parameters"), op.get("parameters")]
                        .into_iter()
                        .flatten()
                        .filter_map(Value::as_array)
                    {
                        for raw in source {
                            let Some(param) = parse_parameter(spec, raw, &mut graph) else {
                                log::warn!("skipping malformed parameter of {method} {path}");
                                continue;
                            };
                            // operation-level parameters override path-level ones
                            parameters.retain(|p| {
                                p.name != param.name || p.location != param.location
                            });
                            parameters.push(param);
                        }
                    }
                    let response_schema = response_schema(spec, op).map(|s| graph.add(&s));
                    operations.push(Operation {
                        method: method.to_uppercase(),
                        path: path.clone(),
                        parameters,
                        response_schema,
                    });
                }
            }
        }

        Ok(Self {
            graph: Arc::new(graph),
            operations,
            base_url: base_url(spec),
        })
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<SchemaGraph> {
        &self.graph
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Base URL declared by the document, if any.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Look up an operation; `method` is compared case-insensitively.
    #[must_use]
    pub fn operation(&self, path: &str, method: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.path == path && op.method.eq_ignore_ascii_case(method))
    }
}

/// Resolve a local `$ref` (e.g. `#/components/parameters/limit`) by JSON pointer.
fn follow_local_ref<'a>(spec: &'a Value, value: &'a Value) -> Option<&'a Value> {
    match value.get("$ref").and_then(Value::as_str) {
        Some(reference) => spec.pointer(reference.strip_prefix('#')?),
        None => Some(value),
    }
}

fn parse_parameter(spec: &Value, raw: &Value, graph: &mut SchemaGraph) -> Option<Parameter> {
    let param = follow_local_ref(spec, raw)?;
    let name = param.get("name")?.as_str()?.to_string();
    let location = ParamLocation::parse(param.get("in")?.as_str()?)?;
    let required = param
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(location == ParamLocation::Path);

    // Swagger 2 non-body parameters carry their constraints inline. Without
    // a type or enum the node stays untyped and generation rejects it.
    let schema = match param.get("schema") {
        Some(schema) => graph.add(schema),
        None => {
            if param.get("type").is_none() && param.get("enum").is_none() {
                log::warn!("parameter {name} declares neither a type nor an enum");
            }
            graph.add(param)
        }
    };

    Some(Parameter {
        name,
        location,
        required,
        schema,
    })
}

fn response_schema(spec: &Value, op: &Value) -> Option<Value> {
    let responses = op.get("responses")?;
    RESPONSE_CODES.iter().find_map(|code| {
        let response = follow_local_ref(spec, responses.get(*code)?)?;
        response
            .pointer("/content/application~1json/schema")
            .or_else(|| response.get("schema"))
            .cloned()
    })
}

fn base_url(spec: &Value) -> Option<String> {
    if let Some(url) = spec
        .pointer("/servers/0/url")
        .and_then(Value::as_str)
    {
        return Some(url.trim_end_matches('/').to_string());
    }
    let base_path = spec
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim_end_matches('/');
    match spec.get("host").and_then(Value::as_str) {
        Some(host) => {
            let scheme = spec
                .pointer("/schemes/0")
                .and_then(Value::as_str)
                .unwrap_or("http");
            Some(format!("{scheme}://{host}{base_path}"))
        }
        None if !base_path.is_empty() => Some(base_path.to_string()),
        None => None,
    }
}

/// Parse a JSON or YAML document, by extension first, then by content.
///
/// # Errors
///
/// Returns [`DocumentError::Parse`] on malformed input.
pub fn parse_spec(path: &Path, content: &str) -> Result<Value, DocumentError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => serde_yml::from_str(content)
            .map_err(|e| DocumentError::Parse(format!("Invalid YAML: {e}"))),
        "json" => serde_json::from_str(content)
            .map_err(|e| DocumentError::Parse(format!("Invalid JSON: {e}"))),
        _ => {
            if content.trim_start().starts_with('{') {
                serde_json::from_str(content)
                    .map_err(|e| DocumentError::Parse(format!("Invalid JSON: {e}")))
            } else {
                serde_yml::from_str(content)
                    .map_err(|e| DocumentError::Parse(format!("Invalid YAML: {e}")))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DocumentError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::NotFound,
            Self::Parse(_) => ErrorKind::Invalid,
        }
    }
}
