//! Plan → generated parameters → request, against a recording transport
//!
//! Run with: cargo test -p apiplan-runner --test end_to_end

use std::cell::RefCell;

use apiplan_core::{ApiDocument, ObjectStore, ParameterFill, TestPlan};
use apiplan_runner::{HttpRequest, HttpResponse, PlanRunner, Transport, TransportError};
use serde_json::{Value, json};

struct Recorder {
    sent: RefCell<Vec<HttpRequest>>,
    body: String,
}

impl Recorder {
    fn new(body: Value) -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            body: body.to_string(),
        }
    }
}

impl Transport for Recorder {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent.borrow_mut().push(request.clone());
        Ok(HttpResponse {
            status: 200,
            content_type: Some("application/json".into()),
            body: self.body.clone(),
        })
    }
}

fn petstore() -> ApiDocument {
    ApiDocument::from_value(&json!({
        "swagger": "2.0",
        "host": "petstore.test",
        "basePath": "/v2",
        "schemes": ["https"],
        "paths": {
            "/pet/findByStatus": {
                "get": {
                    "parameters": [{
                        "name": "status",
                        "in": "query",
                        "required": true,
                        "type": "array",
                        "items": {"type": "string", "enum": ["available", "pending", "sold"]},
                        "collectionFormat": "multi"
                    }],
                    "responses": {
                        "200": {
                            "description": "ok",
                            "schema": {"type": "array", "items": {"$ref": "#/definitions/Pet"}}
                        }
                    }
                }
            }
        },
        "definitions": {
            "Category": {
                "type": "object",
                "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
            },
            "Pet": {
                "type": "object",
                "required": ["name", "photoUrls"],
                "properties": {
                    "id": {"type": "integer"},
                    "category": {"$ref": "#/definitions/Category"},
                    "name": {"type": "string"},
                    "photoUrls": {"type": "array", "items": {"type": "string"}},
                    "status": {"type": "string", "enum": ["available", "pending", "sold"]}
                }
            }
        }
    }))
    .unwrap()
}

const PLAN: &str = "\
find pets:
  - name: by status
    path: /pet/findByStatus
    method: get
";

#[test]
fn find_by_status_sends_one_get() {
    let document = petstore();
    let plan = TestPlan::parse(PLAN).unwrap();
    let transport = Recorder::new(json!([]));
    let mut runner = PlanRunner::new(&document, &plan, &transport).with_seed(Some(42));

    let report = runner.run_case("find pets").unwrap();
    assert_eq!(report.requests.len(), 1);

    let sent = transport.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, "GET");
    assert_eq!(sent[0].url, "https://petstore.test/v2/pet/findByStatus");
    assert!(!sent[0].query.is_empty());
    for (key, value) in &sent[0].query {
        assert_eq!(key, "status");
        assert!(["available", "pending", "sold"].contains(&value.as_str()), "{value}");
    }
}

#[test]
fn status_always_from_enum() {
    let document = petstore();
    let plan = TestPlan::parse(PLAN).unwrap();
    let transport = Recorder::new(json!([]));
    let mut runner = PlanRunner::new(&document, &plan, &transport)
        .with_seed(Some(7))
        .with_fill(ParameterFill::AllMissing);
    for _ in 0..50 {
        runner.run_case("find pets").unwrap();
    }
    for request in transport.sent.borrow().iter() {
        for (_, value) in &request.query {
            assert!(["available", "pending", "sold"].contains(&value.as_str()));
        }
    }
}

#[test]
fn supplied_status_is_sent_as_is() {
    let document = petstore();
    let plan = TestPlan::parse(
        "\
sold:
  - path: /pet/findByStatus
    method: GET
    parameters:
      status: [sold]
",
    )
    .unwrap();
    let transport = Recorder::new(json!([]));
    let mut runner = PlanRunner::new(&document, &plan, &transport);
    let report = runner.run_case("sold").unwrap();
    assert_eq!(
        report.requests[0].query,
        [("status".to_string(), "sold".to_string())]
    );
}

#[test]
fn responses_fill_the_store() {
    let document = petstore();
    let plan = TestPlan::parse(PLAN).unwrap();
    let transport = Recorder::new(json!([
        {"id": 1, "name": "rex", "photoUrls": [], "status": "sold",
         "category": {"id": 3, "name": "dogs"}},
        {"id": 2, "name": "tom", "photoUrls": ["a"], "status": "sold"}
    ]));
    let store = ObjectStore::new(document.graph().clone());
    let mut runner = PlanRunner::new(&document, &plan, &transport)
        .with_seed(Some(1))
        .with_ingest(Some(&store));

    runner.run_case("find pets").unwrap();

    assert_eq!(store.len("Pet").unwrap(), 2);
    assert_eq!(store.len("Category").unwrap(), 1);
    let rex = store
        .find("Pet", &apiplan_core::Query::fields(&json!({"name": "rex"})))
        .unwrap();
    assert_eq!(rex.len(), 1);
    assert_eq!(rex[0]["id"], json!(1));
}
