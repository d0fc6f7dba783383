//! Test plan execution
//!
//! Walks the steps of a case, fills in parameters the plan leaves out with
//! generated values, and sends one request per step. `ref` steps run
//! another case in place.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use serde_json::Value;

use apiplan_core::{ApiDocument, ErrorKind, ObjectStore, Operation, ParameterFill, Test, TestPlan};

use crate::datagen::{self, GenerateError};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Requests sent while running one case, references expanded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaseReport {
    pub case: String,
    pub requests: Vec<RequestRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub status: u16,
}

/// Runs test cases of a plan against one document.
pub struct PlanRunner<'a, T: Transport> {
    document: &'a ApiDocument,
    plan: &'a TestPlan,
    transport: &'a T,
    base_url: String,
    headers: BTreeMap<String, String>,
    fill: ParameterFill,
    rng: SmallRng,
    store: Option<&'a ObjectStore>,
}

impl<'a, T: Transport> PlanRunner<'a, T> {
    /// Requests go to the document's base URL unless [`Self::with_base_url`]
    /// overrides it.
    #[must_use]
    pub fn new(document: &'a ApiDocument, plan: &'a TestPlan, transport: &'a T) -> Self {
        Self {
            document,
            plan,
            transport,
            base_url: document.base_url().unwrap_or_default().to_string(),
            headers: BTreeMap::new(),
            fill: ParameterFill::default(),
            rng: SmallRng::from_entropy(),
            store: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub const fn with_fill(mut self, fill: ParameterFill) -> Self {
        self.fill = fill;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if let Some(seed) = seed {
            self.rng = SmallRng::seed_from_u64(seed);
        }
        self
    }

    /// Store objects found in successful JSON responses into `store`.
    #[must_use]
    pub const fn with_ingest(mut self, store: Option<&'a ObjectStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Parameters for `test`: the supplied ones plus generated values for
    /// missing declared parameters, as many as the fill mode allows.
    ///
    /// The test itself is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::OperationNotFound`] if the document has no such
    /// operation and [`RunError::Generate`] if a value cannot be generated.
    pub fn resolve_parameters(&mut self, test: &Test) -> Result<BTreeMap<String, Value>, RunError> {
        let op = self.operation(test)?;
        self.resolve_for(op, test)
    }

    fn operation(&self, test: &Test) -> Result<&'a Operation, RunError> {
        self.document
            .operation(&test.path, &test.method)
            .ok_or_else(|| RunError::OperationNotFound {
                method: test.method.clone(),
                path: test.path.clone(),
            })
    }

    fn resolve_for(&mut self, op: &Operation, test: &Test) -> Result<BTreeMap<String, Value>, RunError> {
        let mut parameters = test.parameters.clone();
        let document = self.document;
        let graph = document.graph();
        for param in &op.parameters {
            if parameters.contains_key(&param.name) {
                continue;
            }
            let value = datagen::generate_parameter(graph, param, &mut self.rng).map_err(|source| {
                RunError::Generate {
                    parameter: param.name.clone(),
                    source,
                }
            })?;
            log::debug!("{} {}: generated {} = {value}", op.method, op.path, param.name);
            parameters.insert(param.name.clone(), value);
            if self.fill == ParameterFill::FirstMissing {
                break;
            }
        }
        Ok(parameters)
    }

    /// Run one step: a reference runs the named case, anything else sends
    /// one request.
    ///
    /// # Errors
    ///
    /// See [`Self::run_case`].
    pub fn run_test(&mut self, test: &Test) -> Result<Vec<RequestRecord>, RunError> {
        let mut requests = Vec::new();
        self.run_test_inner(test, &mut Vec::new(), &mut requests)?;
        Ok(requests)
    }

    /// Run every step of case `name` in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::CaseNotFound`] for absent or empty cases,
    /// [`RunError::ReferenceCycle`] when a case reaches itself through `ref`
    /// steps, and the first step error otherwise.
    pub fn run_case(&mut self, name: &str) -> Result<CaseReport, RunError> {
        let mut requests = Vec::new();
        self.run_case_inner(name, &mut Vec::new(), &mut requests)?;
        log::info!("case {name}: {} requests", requests.len());
        Ok(CaseReport {
            case: name.to_string(),
            requests,
        })
    }

    fn run_case_inner(
        &mut self,
        name: &str,
        stack: &mut Vec<String>,
        requests: &mut Vec<RequestRecord>,
    ) -> Result<(), RunError> {
        if stack.iter().any(|n| n == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(RunError::ReferenceCycle(cycle));
        }
        let plan = self.plan;
        let case = plan
            .get(name)
            .filter(|c| !c.steps.is_empty())
            .ok_or_else(|| RunError::CaseNotFound(name.to_string()))?;

        stack.push(name.to_string());
        for test in &case.steps {
            self.run_test_inner(test, stack, requests)?;
        }
        stack.pop();
        Ok(())
    }

    fn run_test_inner(
        &mut self,
        test: &Test,
        stack: &mut Vec<String>,
        requests: &mut Vec<RequestRecord>,
    ) -> Result<(), RunError> {
        if let Some(target) = &test.reference {
            log::debug!("{}: ref {target}", test.name);
            return self.run_case_inner(target, stack, requests);
        }

        let op = self.operation(test)?;
        let parameters = self.resolve_for(op, test)?;
        if op.method != "GET" {
            return Err(RunError::UnsupportedMethod(op.method.clone()));
        }

        let request = HttpRequest {
            method: op.method.clone(),
            url: format!("{}{}", self.base_url, op.path),
            query: query_pairs(&parameters),
            headers: self.headers.clone(),
        };
        let response = self.transport.send(&request)?;
        log::info!("{} {} -> {}", request.method, request.url, response.status);

        self.ingest(op, &response);
        requests.push(RequestRecord {
            method: request.method,
            url: request.url,
            query: request.query,
            status: response.status,
        });
        Ok(())
    }

    fn ingest(&self, op: &Operation, response: &HttpResponse) {
        let (Some(store), Some(schema)) = (self.store, op.response_schema) else {
            return;
        };
        if !response.is_success() || !response.is_json() {
            return;
        }
        let body: Value = match serde_json::from_str(&response.body) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("{} {}: response is not JSON: {e}", op.method, op.path);
                return;
            }
        };
        match store.ingest(schema, &body) {
            Ok(n) => log::debug!("{} {}: stored {n} objects", op.method, op.path),
            Err(e) => log::warn!("{} {}: response not stored: {e}", op.method, op.path),
        }
    }
}

/// Query pairs in parameter name order; array values repeat the key.
fn query_pairs(parameters: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in parameters {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|v| (name.clone(), value_to_param_string(v))));
            }
            other => pairs.push((name.clone(), value_to_param_string(other))),
        }
    }
    pairs
}

fn value_to_param_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("test case not found or empty: {0}")]
    CaseNotFound(String),
    #[error("operation not in document: {method} {path}")]
    OperationNotFound { method: String, path: String },
    #[error("method {0} is not supported")]
    UnsupportedMethod(String),
    #[error("reference cycle: {}", .0.join(" -> "))]
    ReferenceCycle(Vec<String>),
    #[error("parameter {parameter}: {source}")]
    Generate {
        parameter: String,
        #[source]
        source: GenerateError,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RunError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CaseNotFound(_) | Self::OperationNotFound { .. } => ErrorKind::NotFound,
            Self::UnsupportedMethod(_) => ErrorKind::Invalid,
            Self::ReferenceCycle(_) => ErrorKind::Internal,
            Self::Generate { source, .. } => source.kind(),
            Self::Transport(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use serde_json::json;

    /// Records requests and answers every one with the same response.
    struct Recorder {
        sent: RefCell<Vec<HttpRequest>>,
        response: HttpResponse,
    }

    impl Recorder {
        fn ok() -> Self {
            Self::with_body("application/json", "[]")
        }

        fn with_body(content_type: &str, body: &str) -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                response: HttpResponse {
                    status: 200,
                    content_type: Some(content_type.into()),
                    body: body.into(),
                },
            }
        }
    }

    impl Transport for Recorder {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent.borrow_mut().push(request.clone());
            Ok(self.response.clone())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Send {
                url: request.url.clone(),
                message: "connection refused".into(),
            })
        }
    }

    fn document() -> ApiDocument {
        ApiDocument::from_value(&json!({
            "openapi": "3.0.0",
            "servers": [{"url": "http://api.test/v1/"}],
            "paths": {
                "/items": {
                    "get": {
                        "parameters": [
                            {"name": "a", "in": "query", "schema": {"type": "integer", "minimum": 1, "maximum": 9}},
                            {"name": "b", "in": "query", "schema": {"type": "string"}},
                            {"name": "tags", "in": "query", "schema": {"type": "array", "items": {"type": "string", "enum": ["x"]}, "minItems": 2, "maxItems": 2}}
                        ],
                        "responses": {"200": {"content": {"application/json": {"schema": {
                            "type": "array", "items": {"$ref": "#/components/schemas/Item"}
                        }}}}}
                    },
                    "post": {"responses": {}}
                },
                "/broken": {
                    "get": {"parameters": [{"name": "o", "in": "query", "schema": {"type": "object"}}]}
                }
            },
            "components": {"schemas": {"Item": {
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "integer"}}
            }}}
        }))
        .unwrap()
    }

    fn plan(text: &str) -> TestPlan {
        TestPlan::parse(text).unwrap()
    }

    // ── Parameter resolution ──

    #[test]
    fn first_missing_generates_one() {
        let doc = document();
        let plan = TestPlan::new();
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport).with_seed(Some(1));
        let test = Test {
            path: "/items".into(),
            method: "GET".into(),
            ..Test::default()
        };
        let params = runner.resolve_parameters(&test).unwrap();
        assert_eq!(params.keys().collect::<Vec<_>>(), ["a"]);
        assert!(test.parameters.is_empty());
    }

    #[test]
    fn first_missing_skips_supplied() {
        let doc = document();
        let plan = TestPlan::new();
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport).with_seed(Some(1));
        let mut test = Test {
            path: "/items".into(),
            method: "GET".into(),
            ..Test::default()
        };
        test.parameters.insert("a".into(), json!(3));
        let params = runner.resolve_parameters(&test).unwrap();
        assert_eq!(params["a"], json!(3));
        assert!(params["b"].as_str().unwrap().starts_with("b-"));
        assert!(!params.contains_key("tags"));
    }

    #[test]
    fn all_missing_generates_every_parameter() {
        let doc = document();
        let plan = TestPlan::new();
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport)
            .with_seed(Some(1))
            .with_fill(ParameterFill::AllMissing);
        let test = Test {
            path: "/items".into(),
            method: "get".into(),
            ..Test::default()
        };
        let params = runner.resolve_parameters(&test).unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params["tags"], json!(["x", "x"]));
    }

    #[test]
    fn unknown_operation() {
        let doc = document();
        let plan = TestPlan::new();
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport);
        let test = Test {
            path: "/nope".into(),
            method: "GET".into(),
            ..Test::default()
        };
        let err = runner.resolve_parameters(&test).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn same_seed_same_values() {
        let doc = document();
        let plan = TestPlan::new();
        let transport = Recorder::ok();
        let test = Test {
            path: "/items".into(),
            method: "GET".into(),
            ..Test::default()
        };
        let mut a = PlanRunner::new(&doc, &plan, &transport)
            .with_seed(Some(7))
            .with_fill(ParameterFill::AllMissing);
        let mut b = PlanRunner::new(&doc, &plan, &transport)
            .with_seed(Some(7))
            .with_fill(ParameterFill::AllMissing);
        assert_eq!(
            a.resolve_parameters(&test).unwrap(),
            b.resolve_parameters(&test).unwrap()
        );
    }

    // ── Execution ──

    #[test]
    fn sends_get_with_query() {
        let doc = document();
        let plan = plan("list:\n  - name: l\n    path: /items\n    method: get\n    parameters:\n      tags: [p, q]\n");
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport)
            .with_seed(Some(3))
            .with_headers(BTreeMap::from([("X-Key".to_string(), "k".to_string())]));
        let report = runner.run_case("list").unwrap();

        assert_eq!(report.requests.len(), 1);
        let sent = transport.sent.borrow();
        assert_eq!(sent[0].url, "http://api.test/v1/items");
        assert_eq!(sent[0].method, "GET");
        assert_eq!(sent[0].headers["X-Key"], "k");
        let keys: Vec<&str> = sent[0].query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "tags", "tags"]);
        assert_eq!(sent[0].query[1].1, "p");
        assert_eq!(sent[0].query[2].1, "q");
    }

    #[test]
    fn base_url_override() {
        let doc = document();
        let plan = plan("c:\n  - path: /items\n    method: GET\n");
        let transport = Recorder::ok();
        let mut runner =
            PlanRunner::new(&doc, &plan, &transport).with_base_url(Some("http://localhost:8080/"));
        runner.run_case("c").unwrap();
        assert_eq!(transport.sent.borrow()[0].url, "http://localhost:8080/items");
    }

    #[test]
    fn reference_runs_case_in_place() {
        let doc = document();
        let plan = plan(
            "inner:\n  - path: /items\n    method: GET\n\
             outer:\n  - ref: inner\n  - path: /items\n    method: GET\n    parameters: {a: 5}\n",
        );
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport);
        let report = runner.run_case("outer").unwrap();
        assert_eq!(report.case, "outer");
        assert_eq!(report.requests.len(), 2);
        assert!(report.requests[1].query.contains(&("a".to_string(), "5".to_string())));
    }

    #[test]
    fn missing_and_empty_cases() {
        let doc = document();
        let plan = plan("empty:\n");
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport);
        assert!(matches!(runner.run_case("absent"), Err(RunError::CaseNotFound(_))));
        let err = runner.run_case("empty").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn reference_cycle_is_internal() {
        let doc = document();
        let plan = plan("a:\n  - ref: b\n---\nb:\n  - ref: a\n");
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport);
        let err = runner.run_case("a").unwrap_err();
        assert_eq!(err.to_string(), "reference cycle: a -> b -> a");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn non_get_is_unsupported() {
        let doc = document();
        let plan = plan("c:\n  - path: /items\n    method: post\n");
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport);
        let err = runner.run_case("c").unwrap_err();
        assert!(matches!(err, RunError::UnsupportedMethod(ref m) if m == "POST"));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn first_error_aborts_case() {
        let doc = document();
        let plan = plan(
            "c:\n  - path: /broken\n    method: GET\n  - path: /items\n    method: GET\n",
        );
        let transport = Recorder::ok();
        let mut runner = PlanRunner::new(&doc, &plan, &transport);
        let err = runner.run_case("c").unwrap_err();
        assert!(matches!(err, RunError::Generate { ref parameter, .. } if parameter == "o"));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn transport_error_kind() {
        let doc = document();
        let plan = plan("c:\n  - path: /items\n    method: GET\n");
        let mut runner = PlanRunner::new(&doc, &plan, &Unreachable);
        let err = runner.run_case("c").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    // ── Ingestion ──

    #[test]
    fn ingests_json_response() {
        let doc = document();
        let plan = plan("c:\n  - path: /items\n    method: GET\n");
        let transport = Recorder::with_body("application/json", r#"[{"id": 1}, {"id": 2}]"#);
        let store = ObjectStore::new(doc.graph().clone());
        let mut runner = PlanRunner::new(&doc, &plan, &transport).with_ingest(Some(&store));
        runner.run_case("c").unwrap();
        assert_eq!(store.len("Item").unwrap(), 2);
    }

    #[test]
    fn non_json_response_not_ingested() {
        let doc = document();
        let plan = plan("c:\n  - path: /items\n    method: GET\n");
        let transport = Recorder::with_body("text/plain", r#"[{"id": 1}]"#);
        let store = ObjectStore::new(doc.graph().clone());
        let mut runner = PlanRunner::new(&doc, &plan, &transport).with_ingest(Some(&store));
        runner.run_case("c").unwrap();
        assert_eq!(store.len("Item").unwrap(), 0);
    }

    #[test]
    fn query_pairs_format() {
        let params = BTreeMap::from([
            ("n".to_string(), json!(1.5)),
            ("s".to_string(), json!("text")),
            ("v".to_string(), json!([true, 2])),
        ]);
        assert_eq!(
            query_pairs(&params),
            [
                ("n".to_string(), "1.5".to_string()),
                ("s".to_string(), "text".to_string()),
                ("v".to_string(), "true".to_string()),
                ("v".to_string(), "2".to_string()),
            ]
        );
    }
}
