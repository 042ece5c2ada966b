use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LOINC_SYSTEM: &str = "http://loinc.org";
pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// LOINC code stamped on every uploaded glucose observation and used as the
/// search filter for the last uploaded one.
pub const GLUCOSE_LOINC_CODE: &str = "14745-4";
pub const GLUCOSE_LOINC_DISPLAY: &str = "Glucose [Moles/volume] in Blood";
pub const UNIT_MG_DL: &str = "mg/dL";

pub const REFERENCE_RANGE_LOW_MG_DL: f64 = 70.0;
pub const REFERENCE_RANGE_HIGH_MG_DL: f64 = 180.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub status: String,
    pub div: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "use")]
    pub kind: String,
    pub system: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub reference: String,
    pub display: String,
}

impl Reference {
    pub fn patient(id: &str, display: &str) -> Self {
        Self {
            reference: format!("Patient/{id}"),
            display: display.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
    pub system: String,
    pub code: String,
}

impl Quantity {
    pub fn mg_per_dl(value: f64) -> Self {
        Self {
            value,
            unit: UNIT_MG_DL.to_string(),
            system: UCUM_SYSTEM.to_string(),
            code: UNIT_MG_DL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub low: Quantity,
    pub high: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub resource_type: String,
    pub id: String,
    pub text: Narrative,
    pub identifier: Vec<Identifier>,
    pub status: String,
    pub effective_date_time: DateTime<Utc>,
    pub code: CodeableConcept,
    pub subject: Reference,
    pub issued: DateTime<Utc>,
    pub performer: Vec<Reference>,
    pub value_quantity: Quantity,
    pub reference_range: Vec<ReferenceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub resource_type: String,
    pub id: String,
    pub status: DeviceStatus,
    pub manufacturer: String,
    pub model: String,
    pub subject: Reference,
    pub serial_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRequest {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,
    pub resource: Observation,
    pub request: BundleRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub entry: Vec<BundleEntry>,
}

/// Subset of a FHIR search-set bundle needed to read the newest observation date.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchSet {
    #[serde(default)]
    pub entry: Vec<SearchEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchEntry {
    pub resource: SearchResource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResource {
    pub effective_date_time: Option<String>,
}
