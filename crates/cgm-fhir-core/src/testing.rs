use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, MappedLocalTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tokio::sync::Notify;

use crate::config::VendorConfig;
use crate::fhir::{FhirApi, FhirError, UploadOutcome};
use crate::identity::{IdentityError, IdentityProvider};
use crate::readings::{AuthTicket, Connection, GlucoseItem, GraphData, Sensor};
use crate::resources::Observation;
use crate::session::{SessionContext, VendorHeaders};
use crate::vendor::{VendorApi, VendorError};

pub fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let uniq = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("unix epoch")
        .as_nanos();
    path.push(format!("cgm-fhir-tests-{name}-{uniq}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

pub fn session() -> SessionContext {
    SessionContext::new(VendorHeaders::new(&VendorConfig::default()))
}

pub fn connection(patient_id: &str, status: i32) -> Connection {
    Connection {
        id: format!("conn-{patient_id}"),
        patient_id: patient_id.to_string(),
        country: "NL".to_string(),
        status,
        first_name: "Jan".to_string(),
        last_name: "Jansen".to_string(),
        sensor: Sensor {
            device_id: "dev-1".to_string(),
            sn: "0M0001ABCD".to_string(),
            a: 1_700_000_000,
        },
    }
}

pub fn item(factory_timestamp: &str, value: f64) -> GlucoseItem {
    GlucoseItem {
        factory_timestamp: factory_timestamp.to_string(),
        timestamp: factory_timestamp.to_string(),
        value_in_mg_per_dl: value,
    }
}

pub fn graph(items: Vec<GlucoseItem>) -> GraphData {
    GraphData {
        graph_data: items,
        ..GraphData::default()
    }
}

/// Three minute-aligned samples: 90, 250 and 55 mg/dL.
pub fn three_samples() -> GraphData {
    graph(vec![
        item("1/15/2024 8:00:00 AM", 90.0),
        item("1/15/2024 8:01:00 AM", 250.0),
        item("1/15/2024 8:02:00 AM", 55.0),
    ])
}

/// Central European zone around the 2024-03-31 spring-forward: 02:00 local
/// jumps to 03:00, so wall-clock times in between do not exist.
#[derive(Debug, Clone, Copy)]
pub struct SpringForwardZone;

impl SpringForwardZone {
    fn winter() -> FixedOffset {
        FixedOffset::east_opt(3600).expect("valid offset")
    }

    fn summer() -> FixedOffset {
        FixedOffset::east_opt(7200).expect("valid offset")
    }

    fn gap_start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 31)
            .and_then(|date| date.and_hms_opt(2, 0, 0))
            .expect("valid date")
    }
}

impl TimeZone for SpringForwardZone {
    type Offset = FixedOffset;

    fn from_offset(_offset: &FixedOffset) -> Self {
        SpringForwardZone
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> MappedLocalTime<FixedOffset> {
        self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).expect("midnight"))
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> MappedLocalTime<FixedOffset> {
        let gap_start = Self::gap_start();
        let gap_end = gap_start + chrono::Duration::hours(1);
        if *local < gap_start {
            MappedLocalTime::Single(Self::winter())
        } else if *local >= gap_end {
            MappedLocalTime::Single(Self::summer())
        } else {
            MappedLocalTime::None
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).expect("midnight"))
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        if *utc < Self::gap_start() - chrono::Duration::hours(1) {
            Self::winter()
        } else {
            Self::summer()
        }
    }
}

pub struct LoginGate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct FakeVendor {
    pub login_ok: bool,
    pub ticket_expires: i64,
    pub connections: Vec<Connection>,
    pub series: HashMap<String, GraphData>,
    pub gate: Option<Arc<LoginGate>>,
    pub login_calls: AtomicUsize,
    pub connection_calls: AtomicUsize,
    pub series_calls: AtomicUsize,
}

impl FakeVendor {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            login_ok: true,
            ticket_expires: Utc::now().timestamp() + 3600,
            connections,
            series: HashMap::new(),
            gate: None,
            login_calls: AtomicUsize::new(0),
            connection_calls: AtomicUsize::new(0),
            series_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_series(mut self, patient_id: &str, graph: GraphData) -> Self {
        self.series.insert(patient_id.to_string(), graph);
        self
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VendorApi for FakeVendor {
    async fn login(&self, _session: &SessionContext) -> Result<AuthTicket, VendorError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if !self.login_ok {
            return Err(VendorError::Status(2));
        }
        Ok(AuthTicket {
            token: "vendor-token-0123456789".to_string(),
            expires: self.ticket_expires,
            duration: 3600,
        })
    }

    async fn connections(&self, session: &SessionContext) -> Result<Vec<Connection>, VendorError> {
        self.connection_calls.fetch_add(1, Ordering::SeqCst);
        if session.ticket.is_none() {
            return Err(VendorError::NotLoggedIn);
        }
        if self.connections.is_empty() {
            return Err(VendorError::NoConnections);
        }
        Ok(self.connections.clone())
    }

    async fn glucose_series(
        &self,
        _session: &SessionContext,
        connection_id: &str,
    ) -> Result<GraphData, VendorError> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        self.series
            .get(connection_id)
            .cloned()
            .ok_or_else(|| VendorError::Transport("connection refused".to_string()))
    }
}

pub struct FakeIdentity {
    pub token: Option<String>,
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn token(&self) -> Result<String, IdentityError> {
        self.token.clone().ok_or(IdentityError::NotConfigured)
    }
}

#[derive(Default)]
pub struct FakeFhir {
    pub last: Option<DateTime<Utc>>,
    pub last_fails: bool,
    pub reject_uploads: bool,
    pub uploads: Mutex<Vec<Vec<Observation>>>,
    pub queried: Mutex<Vec<String>>,
}

impl FakeFhir {
    pub fn uploaded(&self) -> Vec<Vec<Observation>> {
        self.uploads.lock().expect("uploads lock").clone()
    }
}

#[async_trait]
impl FhirApi for FakeFhir {
    async fn last_observation_date(
        &self,
        _token: &str,
        patient_id: &str,
    ) -> Result<Option<DateTime<Utc>>, FhirError> {
        self.queried
            .lock()
            .expect("queried lock")
            .push(patient_id.to_string());
        if self.last_fails {
            return Err(FhirError::Status(500));
        }
        Ok(self.last)
    }

    async fn upload(&self, _token: &str, observations: &[Observation]) -> Result<UploadOutcome, FhirError> {
        if observations.is_empty() {
            return Ok(UploadOutcome::NothingToUpload);
        }
        if self.reject_uploads {
            return Err(FhirError::Status(422));
        }
        self.uploads
            .lock()
            .expect("uploads lock")
            .push(observations.to_vec());
        Ok(UploadOutcome::Uploaded(observations.len()))
    }
}
