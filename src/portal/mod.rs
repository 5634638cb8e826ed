//! Denticon portal automation.
//!
//! One headless Chromium session is driven end-to-end per lookup:
//! login, office selection, DOB search, result disambiguation, and
//! record extraction. The portal renders everything inside iframes, so
//! most reads go through injected JavaScript rather than flat selectors.

pub mod browser;
mod dom;
mod extract;
mod session;

pub use browser::{engine_status, EngineStatus};
pub use session::PortalClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Portal automation errors. None of these are retried; every failed
/// wait is terminal for the request that hit it.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),
}

/// One row of the multi-result search table. Exists only while a search
/// with several hits is being disambiguated.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidatePatient {
    pub index: usize,
    /// Stable portal patient id carried on the row element. Rows are
    /// clicked by this id, never by position, so a table reflow between
    /// extraction and click cannot select the wrong patient.
    #[serde(rename = "patientId")]
    pub patient_id: Option<String>,
    pub text: String,
}

/// A dated treatment-plan note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRow {
    pub date: String,
    pub description: String,
}

/// The extracted patient summary.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub patient_name: String,
    pub provider: Option<String>,
    pub last_visit: Option<String>,
    pub treatment_rows: Vec<TreatmentRow>,
}

/// Outcome of a completed lookup. A search with zero (or zero matching)
/// hits is a valid negative answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(PatientRecord),
    NotFound,
}

/// The seam between the HTTP facade and the automation workflow.
#[async_trait]
pub trait PatientLookup: Send + Sync {
    async fn lookup_patient(
        &self,
        branch: &str,
        dob: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<LookupOutcome, PortalError>;
}
