//! Dry run plan types and config validation
//!
//! Describes what a plan run *would* do without sending any requests.
//! Used for pre-flight validation and CI previews.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ParameterFill;
use crate::document::ApiDocument;
use crate::plan::{Test, TestPlan};
use crate::Config;

// ── Plan types ──

/// Complete dry run plan: cases, request counts, and validation results.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DryRunPlan {
    /// Per-case execution plan
    pub cases: Vec<CasePlan>,
    /// Total requests that would be sent, references expanded
    pub total_requests: u64,
    /// Config/document/plan validation results
    pub validations: Vec<Validation>,
}

/// Execution plan for a single test case.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CasePlan {
    pub case: String,
    pub steps: Vec<StepPlan>,
}

/// One step of a case.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepPlan {
    pub name: String,
    pub action: StepAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    /// Runs another case
    Reference { case: String },
    /// Sends one request
    Request {
        method: String,
        path: String,
        /// Parameters given by the plan
        supplied: Vec<String>,
        /// Declared parameters that would be generated
        generated: Vec<String>,
        /// Declared parameters left out by the fill mode
        unset: Vec<String>,
    },
}

/// A validation check result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub check: String,
    pub status: ValidationStatus,
    pub message: String,
}

/// Status of a validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl Validation {
    fn new(check: &str, status: ValidationStatus, message: String) -> Self {
        Self {
            check: check.into(),
            status,
            message,
        }
    }
}

// ── Plan building ──

impl DryRunPlan {
    /// Resolve every step of the selected cases against `document`.
    ///
    /// `selected` empty means every case in plan order.
    #[must_use]
    pub fn build(
        document: &ApiDocument,
        plan: &TestPlan,
        fill: ParameterFill,
        selected: &[String],
    ) -> Self {
        let mut validations = Vec::new();
        let names: Vec<&str> = if selected.is_empty() {
            plan.cases().iter().map(|c| c.name.as_str()).collect()
        } else {
            selected.iter().map(String::as_str).collect()
        };

        let mut cases = Vec::new();
        let mut total_requests = 0;
        for name in names {
            let Some(case) = plan.get(name) else {
                validations.push(Validation::new(
                    "case",
                    ValidationStatus::Error,
                    format!("case: {name} (not found)"),
                ));
                continue;
            };
            if case.steps.is_empty() {
                validations.push(Validation::new(
                    "case",
                    ValidationStatus::Error,
                    format!("case: {name} (no steps)"),
                ));
            }
            let steps = case
                .steps
                .iter()
                .map(|test| plan_step(document, plan, fill, name, test, &mut validations))
                .collect();
            match count_requests(plan, name, &mut Vec::new()) {
                Ok(n) => total_requests += n,
                Err(cycle) => validations.push(Validation::new(
                    "ref",
                    ValidationStatus::Error,
                    format!("ref: cycle {}", cycle.join(" -> ")),
                )),
            }
            cases.push(CasePlan {
                case: name.to_string(),
                steps,
            });
        }

        Self {
            cases,
            total_requests,
            validations,
        }
    }
}

fn plan_step(
    document: &ApiDocument,
    plan: &TestPlan,
    fill: ParameterFill,
    case: &str,
    test: &Test,
    validations: &mut Vec<Validation>,
) -> StepPlan {
    let label = format!("{case}/{}", test.name);

    if let Some(target) = &test.reference {
        if plan.get(target).is_none_or(|c| c.steps.is_empty()) {
            validations.push(Validation::new(
                "ref",
                ValidationStatus::Error,
                format!("ref: {label} -> {target} (not found)"),
            ));
        }
        return StepPlan {
            name: test.name.clone(),
            action: StepAction::Reference {
                case: target.clone(),
            },
        };
    }

    let supplied: Vec<String> = test.parameters.keys().cloned().collect();
    let mut generated = Vec::new();
    let mut unset = Vec::new();

    match document.operation(&test.path, &test.method) {
        None => validations.push(Validation::new(
            "operation",
            ValidationStatus::Error,
            format!("operation: {label}: {} {} (not in document)", test.method, test.path),
        )),
        Some(op) => {
            let missing = op
                .parameters
                .iter()
                .filter(|p| !test.parameters.contains_key(&p.name))
                .map(|p| p.name.clone());
            for name in missing {
                if fill == ParameterFill::AllMissing || generated.is_empty() {
                    generated.push(name);
                } else {
                    unset.push(name);
                }
            }
            if !unset.is_empty() {
                validations.push(Validation::new(
                    "parameters",
                    ValidationStatus::Warning,
                    format!("parameters: {label}: {} left unset", unset.join(", ")),
                ));
            }
        }
    }
    if test.method != "GET" {
        validations.push(Validation::new(
            "method",
            ValidationStatus::Error,
            format!("method: {label}: {} (only GET is supported)", test.method),
        ));
    }

    StepPlan {
        name: test.name.clone(),
        action: StepAction::Request {
            method: test.method.clone(),
            path: test.path.clone(),
            supplied,
            generated,
            unset,
        },
    }
}

/// Requests sent by running `name`, references expanded.
///
/// Returns the reference chain on a cycle.
fn count_requests(plan: &TestPlan, name: &str, stack: &mut Vec<String>) -> Result<u64, Vec<String>> {
    if stack.iter().any(|n| n == name) {
        let mut cycle = stack.clone();
        cycle.push(name.to_string());
        return Err(cycle);
    }
    let Some(case) = plan.get(name) else {
        return Ok(0);
    };
    stack.push(name.to_string());
    let mut total = 0;
    for test in &case.steps {
        total += match &test.reference {
            Some(target) => count_requests(plan, target, stack)?,
            None => 1,
        };
    }
    stack.pop();
    Ok(total)
}

// ── Config validation ──

/// Patterns that suggest a placeholder value rather than a real credential.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-token",
    "your_token",
    "YOUR_TOKEN",
    "your-api-key",
    "YOUR_API_KEY",
    "CHANGEME",
    "changeme",
    "placeholder",
    "replace-me",
    "REPLACE_ME",
];

fn check_file(check: &str, path: &std::path::Path) -> Validation {
    if path.exists() {
        Validation::new(
            check,
            ValidationStatus::Ok,
            format!("{check}: {} (exists)", path.display()),
        )
    } else {
        Validation::new(
            check,
            ValidationStatus::Error,
            format!("{check}: {} (not found)", path.display()),
        )
    }
}

/// Validate config and produce validation results.
#[must_use]
pub fn validate_config(config: &Config) -> Vec<Validation> {
    let mut checks = vec![check_file("spec", &config.spec), check_file("plan", &config.plan)];

    if let Some(url) = &config.base_url {
        if url.starts_with("http://") || url.starts_with("https://") {
            checks.push(Validation::new(
                "base_url",
                ValidationStatus::Ok,
                format!("base_url: {url}"),
            ));
        } else {
            checks.push(Validation::new(
                "base_url",
                ValidationStatus::Warning,
                format!("base_url: {url} (missing http:// or https:// prefix)"),
            ));
        }
    }

    if config.timeout_secs == 0 {
        checks.push(Validation::new(
            "timeout",
            ValidationStatus::Error,
            "timeout_secs: must be greater than 0".into(),
        ));
    }

    if config.headers.is_empty() {
        checks.push(Validation::new(
            "headers",
            ValidationStatus::Ok,
            "headers: none configured".into(),
        ));
    } else {
        let mut issues = Vec::new();
        for (key, value) in &config.headers {
            if value.contains('<') && value.contains('>') {
                issues.push(format!("{key}: contains '<...>' placeholder"));
            } else if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| value.contains(*p)) {
                issues.push(format!("{key}: contains '{pattern}', may be a placeholder"));
            }
        }
        if issues.is_empty() {
            checks.push(Validation::new(
                "headers",
                ValidationStatus::Ok,
                format!("headers: {} configured", config.headers.len()),
            ));
        } else {
            checks.extend(
                issues
                    .into_iter()
                    .map(|issue| Validation::new("headers", ValidationStatus::Warning, issue)),
            );
        }
    }

    checks
}

/// Check that requests have somewhere to go.
#[must_use]
pub fn validate_base_url(configured: Option<&str>, document: &ApiDocument) -> Validation {
    match (configured, document.base_url()) {
        (Some(url), _) => Validation::new(
            "base_url",
            ValidationStatus::Ok,
            format!("base_url: {url} (configured)"),
        ),
        (None, Some(url)) => Validation::new(
            "base_url",
            ValidationStatus::Ok,
            format!("base_url: {url} (from document)"),
        ),
        (None, None) => Validation::new(
            "base_url",
            ValidationStatus::Error,
            "base_url: not configured and not declared by the document".into(),
        ),
    }
}

// ── Display helpers ──

impl DryRunPlan {
    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Dry run: {} cases, {} requests planned\n",
            self.cases.len(),
            self.total_requests,
        ));

        for case in &self.cases {
            lines.push(format!("{}:", case.case));
            for step in &case.steps {
                match &step.action {
                    StepAction::Reference { case } => {
                        lines.push(format!("  {} -> ref {case}", step.name));
                    }
                    StepAction::Request {
                        method,
                        path,
                        supplied,
                        generated,
                        unset,
                    } => {
                        lines.push(format!("  {} -> {method} {path}", step.name));
                        for (label, names) in [
                            ("Supplied", supplied),
                            ("Generated", generated),
                            ("Unset", unset),
                        ] {
                            if !names.is_empty() {
                                lines.push(format!("    {label}: {}", names.join(", ")));
                            }
                        }
                    }
                }
            }
            lines.push(String::new());
        }

        lines.push("Validation:".into());
        for v in &self.validations {
            lines.push(format!("  [{}] {}", v.status, v.message));
        }

        lines.join("\n")
    }

    /// Returns true if any validation has Error status.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Error)
    }

    /// Returns true if any validation has Warning status.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Warning)
    }

    /// Checks that failed, deduplicated.
    #[must_use]
    pub fn failed_checks(&self) -> BTreeSet<&str> {
        self.validations
            .iter()
            .filter(|v| v.status == ValidationStatus::Error)
            .map(|v| v.check.as_str())
            .collect()
    }
}
