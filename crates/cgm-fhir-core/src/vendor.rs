use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::readings::{AuthTicket, Connection, GraphData, LoginData, VendorEnvelope};
use crate::session::SessionContext;

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("vendor returned non-zero status {0}")]
    Status(i32),
    #[error("account belongs to region {region}")]
    WrongRegion { region: String },
    #[error("login response carried no auth ticket")]
    MissingTicket,
    #[error("no active session ticket")]
    NotLoggedIn,
    #[error("no connections on this account")]
    NoConnections,
    #[error("connection id is empty")]
    MissingConnectionId,
    #[error("response had no data")]
    EmptyResponse,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for VendorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VendorError::Decode(err.to_string())
        } else {
            VendorError::Transport(err.to_string())
        }
    }
}

#[async_trait]
pub trait VendorApi: Send + Sync {
    async fn login(&self, session: &SessionContext) -> Result<AuthTicket, VendorError>;
    async fn connections(&self, session: &SessionContext) -> Result<Vec<Connection>, VendorError>;
    async fn glucose_series(
        &self,
        session: &SessionContext,
        connection_id: &str,
    ) -> Result<GraphData, VendorError>;
}

/// LibreLinkUp follower API client.
pub struct LibreLinkUpClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl LibreLinkUpClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_authorized<T: DeserializeOwned + Send>(
        &self,
        session: &SessionContext,
        path: &str,
    ) -> Result<T, VendorError> {
        let ticket = session.ticket.as_ref().ok_or(VendorError::NotLoggedIn)?;
        let envelope: VendorEnvelope<T> = self
            .http
            .get(self.url(path))
            .headers(session.headers.authorized(ticket))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if envelope.status != 0 {
            return Err(VendorError::Status(envelope.status));
        }
        envelope.data.ok_or(VendorError::EmptyResponse)
    }
}

/// Interprets a login envelope. Wrong-region redirects are reported, never followed.
pub fn ticket_from_login(envelope: VendorEnvelope<LoginData>) -> Result<AuthTicket, VendorError> {
    if envelope.status != 0 {
        return Err(VendorError::Status(envelope.status));
    }
    let data = envelope.data.ok_or(VendorError::EmptyResponse)?;
    if data.redirect {
        if let Some(region) = data.region {
            return Err(VendorError::WrongRegion {
                region: region.to_ascii_uppercase(),
            });
        }
    }
    data.auth_ticket.ok_or(VendorError::MissingTicket)
}

#[async_trait]
impl VendorApi for LibreLinkUpClient {
    async fn login(&self, session: &SessionContext) -> Result<AuthTicket, VendorError> {
        let body = json!({
            "email": self.username,
            "password": self.password,
        });

        let envelope: VendorEnvelope<LoginData> = self
            .http
            .post(self.url("/llu/auth/login"))
            .headers(session.headers.header_map())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match ticket_from_login(envelope) {
            Ok(ticket) => {
                info!("logged in to LibreLink Up");
                Ok(ticket)
            }
            Err(VendorError::WrongRegion { region }) => {
                error!(%region, "logged in to the wrong region, switch LINK_UP_REGION");
                Err(VendorError::WrongRegion { region })
            }
            Err(err) => Err(err),
        }
    }

    async fn connections(&self, session: &SessionContext) -> Result<Vec<Connection>, VendorError> {
        let connections: Vec<Connection> = self.get_authorized(session, "/llu/connections").await?;
        dump_connections(&connections);
        if connections.is_empty() {
            return Err(VendorError::NoConnections);
        }
        Ok(connections)
    }

    async fn glucose_series(
        &self,
        session: &SessionContext,
        connection_id: &str,
    ) -> Result<GraphData, VendorError> {
        if connection_id.trim().is_empty() {
            return Err(VendorError::MissingConnectionId);
        }
        let path = format!("/llu/connections/{connection_id}/graph");
        self.get_authorized(session, &path).await
    }
}

fn dump_connections(connections: &[Connection]) {
    debug!(count = connections.len(), "LibreLink Up connections");
    for (idx, conn) in connections.iter().enumerate() {
        debug!(
            index = idx + 1,
            name = %conn.display_name(),
            patient_id = %conn.patient_id,
            id = %conn.id,
            country = %conn.country,
            status = conn.status,
            sensor_device_id = %conn.sensor.device_id,
            sensor_sn = %conn.sensor.sn,
            sensor_activated = conn.sensor.a,
            "connection"
        );
    }
}
