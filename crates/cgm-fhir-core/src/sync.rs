use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::fhir::{filter_since_last_observation, FhirApi, UploadOutcome};
use crate::identity::IdentityProvider;
use crate::mapper::{map_connection_to_device, map_to_observations};
use crate::persist::save_bundle_to_file;
use crate::readings::Connection;
use crate::resources::Device;
use crate::session::SessionContext;
use crate::vendor::{VendorApi, VendorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle,
    AuthCheck,
    Login,
    FetchConnections,
    FetchSeries,
    Upload,
    SaveLocal,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Subject id for bundles written to disk. Empty means "use the vendor patient id".
    pub fhir_patient_id: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    FhirServer,
    LocalFiles,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A previous tick still held the session.
    Skipped,
    LoginFailed(String),
    NoConnections,
    ConnectionsFailed(String),
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatientOutcome {
    SeriesUnavailable(String),
    NothingNew,
    Uploaded(usize),
    UploadFailed(String),
    Saved(PathBuf),
    SaveFailed(String),
}

#[derive(Debug, Clone)]
pub struct PatientReport {
    pub patient_id: String,
    pub device: Device,
    pub outcome: PatientOutcome,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub outcome: TickOutcome,
    pub destination: Option<Destination>,
    pub patients: Vec<PatientReport>,
}

impl TickReport {
    fn ended(tick: u64, outcome: TickOutcome) -> Self {
        Self {
            tick,
            outcome,
            destination: None,
            patients: Vec::new(),
        }
    }
}

struct Inner {
    session: SessionContext,
    state: SyncState,
}

impl Inner {
    fn enter(&mut self, next: SyncState) {
        debug!(from = ?self.state, to = ?next, "sync state");
        self.state = next;
    }
}

/// Runs the login → fetch → map → upload workflow once per call to [`tick`].
///
/// The session lives behind a mutex that a tick only ever `try_lock`s, so two
/// overlapping ticks cannot interleave: the late one is skipped.
///
/// [`tick`]: Synchronizer::tick
pub struct Synchronizer<V, I, F> {
    vendor: V,
    identity: I,
    fhir: F,
    settings: SyncSettings,
    inner: Mutex<Inner>,
    ticks: AtomicU64,
}

#[cfg(test)]
impl<V, I, F> Synchronizer<V, I, F> {
    pub(crate) fn vendor(&self) -> &V {
        &self.vendor
    }

    pub(crate) fn fhir(&self) -> &F {
        &self.fhir
    }
}

impl<V, I, F> Synchronizer<V, I, F>
where
    V: VendorApi,
    I: IdentityProvider,
    F: FhirApi,
{
    pub fn new(vendor: V, identity: I, fhir: F, session: SessionContext, settings: SyncSettings) -> Self {
        Self {
            vendor,
            identity,
            fhir,
            settings,
            inner: Mutex::new(Inner {
                session,
                state: SyncState::Idle,
            }),
            ticks: AtomicU64::new(0),
        }
    }

    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let Ok(mut inner) = self.inner.try_lock() else {
            warn!(tick, "previous tick still running, skipping");
            return TickReport::ended(tick, TickOutcome::Skipped);
        };

        let report = self.run(tick, &mut inner).await;
        inner.enter(SyncState::Idle);

        info!(
            tick,
            outcome = ?report.outcome,
            destination = ?report.destination,
            patients = report.patients.len(),
            "tick finished"
        );
        report
    }

    async fn run(&self, tick: u64, inner: &mut Inner) -> TickReport {
        inner.enter(SyncState::AuthCheck);
        let now_secs = Utc::now().timestamp();
        if !inner.session.has_valid_ticket(now_secs) {
            info!("vendor ticket missing or expired, renewing");
            inner.session.clear();
            inner.enter(SyncState::Login);

            match self.vendor.login(&inner.session).await {
                Ok(ticket) => {
                    info!(token = %ticket.token_prefix(), "vendor ticket received");
                    inner.session.replace_ticket(ticket);
                }
                Err(err) => {
                    error!(error = %err, "no vendor ticket received, check credentials and region");
                    inner.session.clear();
                    return TickReport::ended(tick, TickOutcome::LoginFailed(err.to_string()));
                }
            }
        }

        inner.session.identity_token = match self.identity.token().await {
            Ok(token) => {
                info!(token = %token.chars().take(10).collect::<String>(), "identity token received");
                Some(token)
            }
            Err(err) => {
                warn!(error = %err, "no identity token, bundles will be written to disk");
                None
            }
        };
        let destination = if inner.session.identity_token.is_some() {
            Destination::FhirServer
        } else {
            Destination::LocalFiles
        };

        inner.enter(SyncState::FetchConnections);
        let connections = match self.vendor.connections(&inner.session).await {
            Ok(connections) => connections,
            Err(VendorError::NoConnections) => {
                warn!("no LibreLink Up connections found");
                return TickReport::ended(tick, TickOutcome::NoConnections);
            }
            Err(err) => {
                error!(error = %err, "failed to fetch LibreLink Up connections");
                return TickReport::ended(tick, TickOutcome::ConnectionsFailed(err.to_string()));
            }
        };

        let mut patients = Vec::with_capacity(connections.len());
        for connection in &connections {
            patients.push(self.sync_connection(inner, connection).await);
        }

        TickReport {
            tick,
            outcome: TickOutcome::Completed,
            destination: Some(destination),
            patients,
        }
    }

    async fn sync_connection(&self, inner: &mut Inner, connection: &Connection) -> PatientReport {
        let patient_id = connection.patient_id.clone();
        let display = connection.display_name();
        let device = map_connection_to_device(connection);
        debug!(%patient_id, status = ?device.status, serial = %device.serial_number, "device derived");

        inner.enter(SyncState::FetchSeries);
        let graph = match self.vendor.glucose_series(&inner.session, &patient_id).await {
            Ok(graph) => graph,
            Err(err) => {
                info!(%patient_id, error = %err, "no glucose data, skipping patient");
                return PatientReport {
                    patient_id,
                    device,
                    outcome: PatientOutcome::SeriesUnavailable(err.to_string()),
                };
            }
        };

        let token = inner.session.identity_token.clone();
        let outcome = match token.as_deref() {
            Some(token) => {
                inner.enter(SyncState::Upload);
                let observations =
                    filter_since_last_observation(&self.fhir, token, &patient_id, &graph, &display).await;
                match self.fhir.upload(token, &observations).await {
                    Ok(UploadOutcome::Uploaded(count)) => PatientOutcome::Uploaded(count),
                    Ok(UploadOutcome::NothingToUpload) => PatientOutcome::NothingNew,
                    Err(err) => {
                        error!(%patient_id, error = %err, "upload to FHIR server failed");
                        PatientOutcome::UploadFailed(err.to_string())
                    }
                }
            }
            None => {
                inner.enter(SyncState::SaveLocal);
                let subject = if self.settings.fhir_patient_id.is_empty() {
                    patient_id.as_str()
                } else {
                    self.settings.fhir_patient_id.as_str()
                };
                let observations = map_to_observations(subject, &graph, &display);
                match save_bundle_to_file(&self.settings.output_dir, &observations, Utc::now()) {
                    Ok(Some(path)) => PatientOutcome::Saved(path),
                    Ok(None) => PatientOutcome::NothingNew,
                    Err(err) => {
                        error!(%patient_id, error = %err, "saving bundle to disk failed");
                        PatientOutcome::SaveFailed(err.to_string())
                    }
                }
            }
        };

        PatientReport {
            patient_id,
            device,
            outcome,
        }
    }
}
