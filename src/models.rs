//! Output records for the use cases.
//!
//! Search results stay as raw FHIR JSON; only the payor lookup produces a
//! shaped record.

use serde::Serialize;
use serde_json::Value;

/// Payors found for one patient.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatientPayor {
    pub patient_id: String,
    pub payor_ids: Vec<String>,
    pub payor_details: Vec<PayorDetails>,
}

/// Display fields pulled from a payor Organization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PayorDetails {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub org_type: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Value>,
}

impl PayorDetails {
    pub fn from_organization(org: &Value) -> Self {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

        PayorDetails {
            id: text(org.get("id")),
            name: text(org.get("name")),
            org_type: text(org.pointer("/type/0/coding/0/code")),
            phone: org
                .get("telecom")
                .and_then(Value::as_array)
                .and_then(|telecom| {
                    telecom
                        .iter()
                        .find(|t| t.get("system").and_then(Value::as_str) == Some("phone"))
                })
                .and_then(|t| text(t.get("value"))),
            address: org.pointer("/address/0").cloned(),
        }
    }
}
