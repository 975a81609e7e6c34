pub mod orchestrator;

pub use orchestrator::{Collaborator, ReportError, ReportService, ReportSettings};
