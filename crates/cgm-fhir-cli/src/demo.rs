use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cgm_fhir_core::mapper::map_to_observations;
use cgm_fhir_core::persist::save_bundle_to_file;
use cgm_fhir_core::GraphData;
use chrono::Utc;
use tracing::{debug, info};

pub const DEMO_DISPLAY_NAME: &str = "Tester";

/// Accepts either a bare graph payload or the full `{status, data}` envelope.
pub(crate) fn parse_demo_payload(raw: &[u8]) -> Result<GraphData> {
    let value: serde_json::Value = serde_json::from_slice(raw).context("demo source is not JSON")?;
    let graph = match value.get("data") {
        Some(data) if data.is_object() => data.clone(),
        _ => value,
    };
    serde_json::from_value(graph).context("demo source is not a glucose graph response")
}

pub fn run_demo(source: &Path, fhir_patient_id: &str, out_dir: &Path) -> Result<Option<PathBuf>> {
    debug!(source = %source.display(), "running the demo version");
    let raw = fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
    let graph = parse_demo_payload(&raw)?;

    let observations = map_to_observations(fhir_patient_id, &graph, DEMO_DISPLAY_NAME);
    info!(count = observations.len(), "demo observations mapped");

    let saved = save_bundle_to_file(out_dir, &observations, Utc::now())?;
    Ok(saved)
}
