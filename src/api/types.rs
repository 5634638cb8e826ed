//! Wire shapes for the lookup facade.
//!
//! Field names on both sides are fixed by the voice-assistant
//! integration, mixed casing included, so everything external carries an
//! explicit serde rename.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::portal::{LookupOutcome, TreatmentRow};

const NO_RECORD: &str = "No patient record found";
const NOT_AVAILABLE: &str = "N/A";

/// Lookup fields as they appear on the wire; optional until validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLookupParams {
    #[serde(rename = "suaveBranch")]
    pub suave_branch: Option<String>,
    pub dob: Option<String>,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
}

/// Validated lookup parameters: all four fields present and non-empty.
#[derive(Debug, Clone)]
pub struct LookupParams {
    pub suave_branch: String,
    pub dob: String,
    pub first_name: String,
    pub last_name: String,
}

impl RawLookupParams {
    pub fn validate(self) -> Option<LookupParams> {
        let suave_branch = self.suave_branch.filter(|v| !v.is_empty())?;
        let dob = self.dob.filter(|v| !v.is_empty())?;
        let first_name = self.first_name.filter(|v| !v.is_empty())?;
        let last_name = self.last_name.filter(|v| !v.is_empty())?;
        Some(LookupParams {
            suave_branch,
            dob,
            first_name,
            last_name,
        })
    }
}

/// Tool-call envelope the voice platform posts. A request may carry
/// several tool calls; only the first is read.
#[derive(Debug, Deserialize)]
struct ToolCallEnvelope {
    message: EnvelopeMessage,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(rename = "toolCalls")]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: ToolFunction,
}

#[derive(Debug, Deserialize)]
struct ToolFunction {
    arguments: RawLookupParams,
}

/// Pull the lookup fields out of either accepted body shape.
pub fn extract_params(body: &Value) -> RawLookupParams {
    if let Ok(envelope) = serde_json::from_value::<ToolCallEnvelope>(body.clone()) {
        if let Some(call) = envelope.message.tool_calls.into_iter().next() {
            debug!("Tool-call envelope detected");
            return call.function.arguments;
        }
    }
    debug!("Direct request format detected");
    serde_json::from_value(body.clone()).unwrap_or_default()
}

/// Every `/lookup` answer, success or not, goes out with HTTP 200 and
/// one of these bodies.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LookupResponseBody {
    Success(LookupSuccessBody),
    Invalid(ValidationErrorBody),
    Error(LookupErrorBody),
}

#[derive(Debug, Serialize)]
pub struct LookupSuccessBody {
    #[serde(rename = "PatientName")]
    pub patient_name: String,
    #[serde(rename = "DoctorName")]
    pub doctor_name: String,
    #[serde(rename = "PatientLastVisit")]
    pub patient_last_visit: String,
    pub treatmentrows: TreatmentRows,
}

/// The integration wants the row list replaced by the literal "N/A"
/// when there is nothing to read out.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TreatmentRows {
    Rows(Vec<TreatmentRow>),
    Placeholder(&'static str),
}

impl LookupSuccessBody {
    pub fn from_outcome(outcome: LookupOutcome) -> Self {
        match outcome {
            LookupOutcome::Found(record) => Self {
                patient_name: if record.patient_name.is_empty() {
                    NO_RECORD.to_string()
                } else {
                    record.patient_name
                },
                doctor_name: record.provider.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                patient_last_visit: record
                    .last_visit
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                treatmentrows: if record.treatment_rows.is_empty() {
                    TreatmentRows::Placeholder(NOT_AVAILABLE)
                } else {
                    TreatmentRows::Rows(record.treatment_rows)
                },
            },
            LookupOutcome::NotFound => Self {
                patient_name: NO_RECORD.to_string(),
                doctor_name: NOT_AVAILABLE.to_string(),
                patient_last_visit: NOT_AVAILABLE.to_string(),
                treatmentrows: TreatmentRows::Placeholder(NOT_AVAILABLE),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationErrorBody {
    pub error: &'static str,
    pub message: &'static str,
}

impl ValidationErrorBody {
    pub fn missing_fields() -> Self {
        Self {
            error: "Missing required fields",
            message: "Please provide suaveBranch, firstName, lastName, and dob",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LookupErrorBody {
    pub error: bool,
    pub message: String,
    #[serde(rename = "patientName")]
    pub patient_name: &'static str,
    pub provider: &'static str,
    #[serde(rename = "lastVisit")]
    pub last_visit: &'static str,
}

impl LookupErrorBody {
    pub fn from_message(message: String) -> Self {
        Self {
            error: true,
            message,
            patient_name: "Not found",
            provider: "Error occurred",
            last_visit: "N/A",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::PatientRecord;
    use serde_json::json;

    #[test]
    fn test_extract_direct_shape() {
        let body = json!({
            "suaveBranch": "modesto",
            "dob": "02/10/1980",
            "firstName": "John",
            "lastName": "Smith"
        });
        let params = extract_params(&body).validate().unwrap();
        assert_eq!(params.suave_branch, "modesto");
        assert_eq!(params.first_name, "John");
    }

    #[test]
    fn test_extract_tool_call_envelope() {
        let body = json!({
            "message": {
                "toolCalls": [{
                    "function": {
                        "arguments": {
                            "suaveBranch": "merced",
                            "dob": "02/10/1980",
                            "firstName": "Jane",
                            "lastName": "Doe"
                        }
                    }
                }]
            }
        });
        let params = extract_params(&body).validate().unwrap();
        assert_eq!(params.suave_branch, "merced");
        assert_eq!(params.last_name, "Doe");
    }

    #[test]
    fn test_envelope_first_tool_call_wins() {
        let body = json!({
            "message": {
                "toolCalls": [
                    {"function": {"arguments": {
                        "suaveBranch": "first", "dob": "a", "firstName": "b", "lastName": "c"
                    }}},
                    {"function": {"arguments": {
                        "suaveBranch": "second", "dob": "x", "firstName": "y", "lastName": "z"
                    }}}
                ]
            }
        });
        let params = extract_params(&body).validate().unwrap();
        assert_eq!(params.suave_branch, "first");
    }

    #[test]
    fn test_validate_rejects_missing_field() {
        let body = json!({
            "suaveBranch": "modesto",
            "firstName": "John",
            "lastName": "Smith"
        });
        assert!(extract_params(&body).validate().is_none());
    }

    #[test]
    fn test_validate_rejects_empty_field() {
        let body = json!({
            "suaveBranch": "modesto",
            "dob": "",
            "firstName": "John",
            "lastName": "Smith"
        });
        assert!(extract_params(&body).validate().is_none());
    }

    #[test]
    fn test_success_body_uses_fallbacks() {
        let body = LookupSuccessBody::from_outcome(LookupOutcome::NotFound);
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["PatientName"], "No patient record found");
        assert_eq!(v["DoctorName"], "N/A");
        assert_eq!(v["PatientLastVisit"], "N/A");
        assert_eq!(v["treatmentrows"], "N/A");
    }

    #[test]
    fn test_success_body_with_record() {
        let record = PatientRecord {
            patient_name: "John Smith".to_string(),
            provider: Some("Dr. Lee DDS".to_string()),
            last_visit: Some("01/02/2024".to_string()),
            treatment_rows: vec![TreatmentRow {
                date: "12/15/2023".to_string(),
                description: "Crown prep".to_string(),
            }],
        };
        let body = LookupSuccessBody::from_outcome(LookupOutcome::Found(record));
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["PatientName"], "John Smith");
        assert_eq!(v["treatmentrows"][0]["date"], "12/15/2023");
    }

    #[test]
    fn test_error_body_shape() {
        let body = LookupErrorBody::from_message("Timed out waiting for login page".to_string());
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["error"], true);
        assert_eq!(v["patientName"], "Not found");
        assert_eq!(v["provider"], "Error occurred");
        assert_eq!(v["lastVisit"], "N/A");
    }
}
