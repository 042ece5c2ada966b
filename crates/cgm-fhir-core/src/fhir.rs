use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{info, warn};

use crate::mapper::map_to_observations;
use crate::readings::GraphData;
use crate::resources::{
    Bundle, BundleEntry, BundleRequest, Observation, SearchSet, GLUCOSE_LOINC_CODE, LOINC_SYSTEM,
};

#[derive(Debug, Error)]
pub enum FhirError {
    #[error("FHIR server URL not configured")]
    NotConfigured,
    #[error("FHIR server answered {0}")]
    Status(u16),
    #[error("unparseable effectiveDateTime {0:?}")]
    BadDate(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FhirError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FhirError::Decode(err.to_string())
        } else {
            FhirError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    NothingToUpload,
    Uploaded(usize),
}

#[async_trait]
pub trait FhirApi: Send + Sync {
    /// Date of the newest glucose observation stored for `patient_id`.
    /// `Ok(None)` means the patient never uploaded anything.
    async fn last_observation_date(
        &self,
        token: &str,
        patient_id: &str,
    ) -> Result<Option<DateTime<Utc>>, FhirError>;

    async fn upload(&self, token: &str, observations: &[Observation]) -> Result<UploadOutcome, FhirError>;
}

pub struct FhirClient {
    http: Client,
    base_url: String,
}

impl FhirClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn base(&self) -> Result<&str, FhirError> {
        if self.base_url.is_empty() {
            return Err(FhirError::NotConfigured);
        }
        Ok(&self.base_url)
    }
}

/// Parses a FHIR `dateTime`, which may be a full instant or a bare date.
pub fn parse_fhir_date_time(raw: &str) -> Result<DateTime<Utc>, FhirError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| FhirError::BadDate(raw.to_string()))
}

pub fn newest_date(search: &SearchSet) -> Result<Option<DateTime<Utc>>, FhirError> {
    match search
        .entry
        .first()
        .and_then(|entry| entry.resource.effective_date_time.as_deref())
    {
        Some(raw) => parse_fhir_date_time(raw).map(Some),
        None => Ok(None),
    }
}

#[async_trait]
impl FhirApi for FhirClient {
    async fn last_observation_date(
        &self,
        token: &str,
        patient_id: &str,
    ) -> Result<Option<DateTime<Utc>>, FhirError> {
        let url = format!("{}/Observation", self.base()?);
        let code = format!("{LOINC_SYSTEM}|{GLUCOSE_LOINC_CODE}");

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&[
                ("patient", patient_id),
                ("_sort", "-date"),
                ("_count", "1"),
                ("code", code.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FhirError::Status(status.as_u16()));
        }

        let search: SearchSet = response.json().await?;
        let newest = newest_date(&search)?;
        if newest.is_none() {
            info!(%patient_id, "patient never uploaded data previously");
        }
        Ok(newest)
    }

    async fn upload(&self, token: &str, observations: &[Observation]) -> Result<UploadOutcome, FhirError> {
        if observations.is_empty() {
            info!("no new measurements to upload");
            return Ok(UploadOutcome::NothingToUpload);
        }

        let bundle = build_bundle(observations);
        let response = self
            .http
            .post(self.base()?)
            .bearer_auth(token)
            .json(&bundle)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(FhirError::Status(response.status().as_u16()));
        }

        info!(count = observations.len(), "uploaded measurements to FHIR server");
        Ok(UploadOutcome::Uploaded(observations.len()))
    }
}

pub fn build_bundle(observations: &[Observation]) -> Bundle {
    Bundle {
        resource_type: "Bundle".to_string(),
        kind: "transaction".to_string(),
        entry: observations
            .iter()
            .map(|observation| BundleEntry {
                full_url: format!("Observation/{}", observation.id),
                resource: observation.clone(),
                request: BundleRequest {
                    method: "POST".to_string(),
                    url: "Observation".to_string(),
                },
            })
            .collect(),
    }
}

/// Keeps observations at or after `last`. The boundary sample is retained, so
/// consecutive ticks may upload it twice.
pub fn retain_since(observations: Vec<Observation>, last: Option<DateTime<Utc>>) -> Vec<Observation> {
    match last {
        Some(last) => observations
            .into_iter()
            .filter(|observation| observation.effective_date_time >= last)
            .collect(),
        None => observations,
    }
}

/// Maps every sample, then drops those older than the newest observation on
/// the server. When that date is unknown everything is returned.
pub async fn filter_since_last_observation<F: FhirApi + ?Sized>(
    fhir: &F,
    token: &str,
    fhir_patient_id: &str,
    graph: &GraphData,
    display: &str,
) -> Vec<Observation> {
    let last = match fhir.last_observation_date(token, fhir_patient_id).await {
        Ok(last) => last,
        Err(err) => {
            warn!(patient_id = %fhir_patient_id, error = %err, "could not read last observation, sending all samples");
            None
        }
    };

    retain_since(map_to_observations(fhir_patient_id, graph, display), last)
}
