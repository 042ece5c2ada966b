//! Vendor records to FHIR resources.
//!
//! Mapping is pure apart from the fresh UUID assigned to every resource and the
//! timezone used to normalise vendor wall-clock timestamps.

use chrono::{DateTime, Duration, Local, NaiveDateTime, Offset, TimeZone, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::readings::{Connection, GlucoseItem, GraphData, CONNECTION_STATUS_ACTIVE};
use crate::resources::{
    CodeableConcept, Coding, Device, DeviceStatus, Identifier, Narrative, Observation, Quantity,
    Reference, ReferenceRange, GLUCOSE_LOINC_CODE, GLUCOSE_LOINC_DISPLAY, LOINC_SYSTEM,
    REFERENCE_RANGE_HIGH_MG_DL, REFERENCE_RANGE_LOW_MG_DL,
};

const VENDOR_TIMESTAMP_FORMATS: [&str; 3] = [
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const NARRATIVE_DIV: &str =
    "<div xmlns=\"http://www.w3.org/1999/xhtml\"><p><b>Generated Narrative with Details</b></p></div>";
const OBSERVATION_IDENTIFIER_SYSTEM: &str = "http://www.bmc.nl/zorgportal/identifiers/observations";
const OBSERVATION_IDENTIFIER_VALUE: &str = "6323";

pub fn parse_vendor_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    VENDOR_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Reads `raw` as wall-clock time in `tz`, then shifts it by the negative of
/// that zone's UTC offset. Returns `None` only when `raw` does not parse.
pub fn normalize_timestamp_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let naive = parse_vendor_timestamp(raw)?;
    let Some(local) = tz.from_local_datetime(&naive).earliest() else {
        // Wall clock skipped by a DST jump: the shift nets out to reading it as UTC.
        return Some(naive.and_utc());
    };
    let offset_secs = local.offset().fix().local_minus_utc();
    Some(local.with_timezone(&Utc) + Duration::seconds(i64::from(offset_secs)))
}

pub fn normalize_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    normalize_timestamp_in(raw, &Local)
}

fn create_observation(
    fhir_patient_id: &str,
    effective: DateTime<Utc>,
    value_mg_dl: f64,
    display: &str,
) -> Observation {
    let patient = Reference::patient(fhir_patient_id, display);

    Observation {
        resource_type: "Observation".to_string(),
        id: Uuid::new_v4().to_string(),
        text: Narrative {
            status: "empty".to_string(),
            div: NARRATIVE_DIV.to_string(),
        },
        identifier: vec![Identifier {
            kind: "official".to_string(),
            system: OBSERVATION_IDENTIFIER_SYSTEM.to_string(),
            value: OBSERVATION_IDENTIFIER_VALUE.to_string(),
        }],
        status: "final".to_string(),
        effective_date_time: effective,
        code: CodeableConcept {
            coding: vec![Coding {
                system: LOINC_SYSTEM.to_string(),
                code: GLUCOSE_LOINC_CODE.to_string(),
                display: GLUCOSE_LOINC_DISPLAY.to_string(),
            }],
        },
        subject: patient.clone(),
        issued: effective,
        performer: vec![patient],
        value_quantity: Quantity::mg_per_dl(value_mg_dl),
        reference_range: vec![ReferenceRange {
            low: Quantity::mg_per_dl(REFERENCE_RANGE_LOW_MG_DL),
            high: Quantity::mg_per_dl(REFERENCE_RANGE_HIGH_MG_DL),
        }],
    }
}

pub fn map_item_in<Tz: TimeZone>(
    fhir_patient_id: &str,
    item: &GlucoseItem,
    display: &str,
    tz: &Tz,
) -> Option<Observation> {
    let Some(effective) = normalize_timestamp_in(&item.factory_timestamp, tz) else {
        warn!(timestamp = %item.factory_timestamp, "unparseable vendor timestamp, sample dropped");
        return None;
    };
    Some(create_observation(
        fhir_patient_id,
        effective,
        item.value_in_mg_per_dl,
        display,
    ))
}

/// One observation per sample, in input order. Samples whose timestamp cannot
/// be parsed are dropped with a warning.
pub fn map_to_observations_in<Tz: TimeZone>(
    fhir_patient_id: &str,
    graph: &GraphData,
    display: &str,
    tz: &Tz,
) -> Vec<Observation> {
    graph
        .graph_data
        .iter()
        .filter_map(|item| map_item_in(fhir_patient_id, item, display, tz))
        .collect()
}

pub fn map_to_observations(fhir_patient_id: &str, graph: &GraphData, display: &str) -> Vec<Observation> {
    map_to_observations_in(fhir_patient_id, graph, display, &Local)
}

pub fn map_connection_to_device(connection: &Connection) -> Device {
    let status = if connection.status == CONNECTION_STATUS_ACTIVE {
        DeviceStatus::Active
    } else {
        DeviceStatus::Inactive
    };

    Device {
        resource_type: "Device".to_string(),
        id: Uuid::new_v4().to_string(),
        status,
        manufacturer: "Abbott".to_string(),
        model: "FreeStyle Libre".to_string(),
        subject: Reference::patient(&connection.patient_id, &connection.display_name()),
        serial_number: connection.sensor.sn.clone(),
    }
}
