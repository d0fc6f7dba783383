//! apiplan-runner: value generation and test plan execution

pub mod datagen;
pub mod executor;
pub mod regexgen;
pub mod transport;

pub use datagen::GenerateError;
pub use executor::{CaseReport, PlanRunner, RequestRecord, RunError};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport, TransportError};
