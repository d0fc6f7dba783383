//! Test plan DSL
//!
//! A plan file is a sequence of YAML documents separated by lines consisting
//! of exactly `---`. Each document maps test case names to an ordered list of
//! tests:
//!
//! ```yaml
//! find pets:
//!   - name: by status
//!     path: /pet/findByStatus
//!     method: get
//! ---
//! smoke:
//!   - ref: find pets
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

const DOCUMENT_SEPARATOR: &str = "---";

/// One step of a test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Test {
    /// Label used in logs and reports
    pub name: String,
    /// Path template as declared in the API document
    pub path: String,
    /// HTTP method, upper-cased on load
    pub method: String,
    /// Run the named test case instead of sending a request
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Parameter values supplied by the plan; missing ones are generated
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Test {
    fn normalize(&mut self) {
        self.method = self.method.to_uppercase();
        if self.reference.as_deref().is_some_and(str::is_empty) {
            self.reference = None;
        }
    }
}

/// Named, ordered list of tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub name: String,
    pub steps: Vec<Test>,
}

/// Plan file layout, exported as JSON Schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlanDocument(pub BTreeMap<String, Vec<Test>>);

/// All test cases of a plan, in load order, with unique names.
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    cases: Vec<TestCase>,
    index: HashMap<String, usize>,
}

impl TestPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a plan file.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Io`] if the file cannot be read, otherwise as [`TestPlan::parse`].
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Parse plan text into a fresh plan.
    ///
    /// # Errors
    ///
    /// See [`TestPlan::load_str`].
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        let mut plan = Self::new();
        plan.load_str(text)?;
        Ok(plan)
    }

    /// Add one case.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::DuplicateCase`] if the name is already taken.
    pub fn add(&mut self, name: &str, steps: Vec<Test>) -> Result<(), PlanError> {
        if self.index.contains_key(name) {
            log::warn!("duplicate name {name} found in test plan");
            return Err(PlanError::DuplicateCase(name.to_string()));
        }
        self.push(name.to_string(), steps);
        Ok(())
    }

    /// Add every case in `text`. Either all of them are added or none.
    ///
    /// Returns the number of cases added.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Parse`] for a document that is not a mapping of
    /// case names to test lists, and [`PlanError::DuplicateCase`] if a name
    /// repeats within `text` or is already in the plan.
    pub fn load_str(&mut self, text: &str) -> Result<usize, PlanError> {
        let mut staged: Vec<(String, Vec<Test>)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (number, document) in split_documents(text).iter().enumerate() {
            for (name, steps) in parse_document(number + 1, document)? {
                if self.index.contains_key(&name) || !seen.insert(name.clone()) {
                    log::warn!("duplicate name {name} found in test plan");
                    return Err(PlanError::DuplicateCase(name));
                }
                staged.push((name, steps));
            }
        }

        let added = staged.len();
        for (name, steps) in staged {
            self.push(name, steps);
        }
        Ok(added)
    }

    fn push(&mut self, name: String, mut steps: Vec<Test>) {
        steps.iter_mut().for_each(Test::normalize);
        self.index.insert(name.clone(), self.cases.len());
        self.cases.push(TestCase { name, steps });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.index.get(name).map(|&i| &self.cases[i])
    }

    /// Cases in load order.
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

fn split_documents(text: &str) -> Vec<String> {
    let mut documents = vec![String::new()];
    for line in text.lines() {
        if line.trim_end() == DOCUMENT_SEPARATOR {
            documents.push(String::new());
        } else if let Some(current) = documents.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    documents
}

fn parse_document(number: usize, document: &str) -> Result<Vec<(String, Vec<Test>)>, PlanError> {
    let parse_error = |message: String| PlanError::Parse { document: number, message };
    if document.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_yml::Value =
        serde_yml::from_str(document).map_err(|e| parse_error(e.to_string()))?;
    let mapping = match value {
        serde_yml::Value::Null => return Ok(Vec::new()),
        serde_yml::Value::Mapping(mapping) => mapping,
        _ => return Err(parse_error("expected a mapping of test case names".to_string())),
    };

    let mut cases = Vec::with_capacity(mapping.len());
    for (key, steps) in mapping {
        let Some(name) = key.as_str() else {
            return Err(parse_error(format!("test case name is not a string: {key:?}")));
        };
        let steps: Vec<Test> = if steps.is_null() {
            Vec::new()
        } else {
            serde_yml::from_value(steps).map_err(|e| parse_error(format!("{name}: {e}")))?
        };
        cases.push((name.to_string(), steps));
    }
    Ok(cases)
}

/// JSON Schema of the plan document format.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(PlanDocument);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("invalid test plan document {document}: {message}")]
    Parse { document: usize, message: String },
    #[error("duplicate name {0} found in test plan")]
    DuplicateCase(String),
}

impl PlanError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::NotFound,
            Self::Parse { .. } | Self::DuplicateCase(_) => ErrorKind::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLAN: &str = "\
find pets:
  - name: by status
    path: /pet/findByStatus
    method: get
    parameters:
      status: available
---
---
smoke:
  - ref: find pets
  - name: second
    path: /store/inventory
    method: Get
";

    #[test]
    fn parses_documents_in_order() {
        let plan = TestPlan::parse(PLAN).unwrap();
        let names: Vec<&str> = plan.cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["find pets", "smoke"]);

        let find = plan.get("find pets").unwrap();
        assert_eq!(find.steps[0].method, "GET");
        assert_eq!(find.steps[0].parameters["status"], json!("available"));

        let smoke = plan.get("smoke").unwrap();
        assert_eq!(smoke.steps[0].reference.as_deref(), Some("find pets"));
        assert_eq!(smoke.steps[1].method, "GET");
    }

    #[test]
    fn cases_in_one_document_keep_order() {
        let plan = TestPlan::parse("b:\n  - name: x\na:\n  - name: y\n").unwrap();
        let names: Vec<&str> = plan.cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn separator_must_be_whole_line() {
        let plan = TestPlan::parse("a:\n  - name: x---y\n").unwrap();
        assert_eq!(plan.get("a").unwrap().steps[0].name, "x---y");
    }

    #[test]
    fn empty_ref_is_none() {
        let plan = TestPlan::parse("a:\n  - name: x\n    ref: ''\n").unwrap();
        assert_eq!(plan.get("a").unwrap().steps[0].reference, None);
    }

    #[test]
    fn empty_case_is_kept() {
        let plan = TestPlan::parse("empty:\n").unwrap();
        assert!(plan.get("empty").unwrap().steps.is_empty());
    }

    #[test]
    fn duplicate_within_load_rejects_everything() {
        let mut plan = TestPlan::new();
        let err = plan
            .load_str("a:\n  - name: x\n---\nb:\n  - name: y\n---\na:\n  - name: z\n")
            .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateCase(ref n) if n == "a"));
        assert!(plan.is_empty());
    }

    #[test]
    fn duplicate_against_existing_plan_rejects_load() {
        let mut plan = TestPlan::parse("a:\n  - name: x\n").unwrap();
        assert!(plan.load_str("c:\n  - name: y\n---\na:\n  - name: z\n").is_err());
        assert_eq!(plan.len(), 1);
        assert!(plan.get("c").is_none());
        assert_eq!(plan.load_str("c:\n  - name: y\n").unwrap(), 1);
    }

    #[test]
    fn add_rejects_duplicate() {
        let mut plan = TestPlan::new();
        plan.add("a", vec![Test::default()]).unwrap();
        let err = plan.add("a", Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn non_mapping_document_is_parse_error() {
        let err = TestPlan::parse("a:\n  - name: x\n---\n- just\n- a list\n").unwrap_err();
        assert!(matches!(err, PlanError::Parse { document: 2, .. }));
    }

    #[test]
    fn steps_must_be_a_list() {
        let err = TestPlan::parse("a: 5\n").unwrap_err();
        assert!(err.to_string().contains("invalid test plan document 1"));
    }

    #[test]
    fn schema_has_title() {
        let schema: serde_json::Value = serde_json::from_str(&generate_schema()).unwrap();
        assert_eq!(schema["title"], "PlanDocument");
    }
}
