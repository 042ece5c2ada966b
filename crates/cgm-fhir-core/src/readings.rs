use serde::{Deserialize, Serialize};

/// Vendor session credential returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTicket {
    pub token: String,
    /// Epoch seconds after which the ticket is rejected.
    pub expires: i64,
    pub duration: i64,
}

impl AuthTicket {
    pub fn is_valid_at(&self, now_secs: i64) -> bool {
        !self.token.is_empty() && now_secs < self.expires
    }

    /// First characters of the token, safe to log.
    pub fn token_prefix(&self) -> &str {
        let end = self
            .token
            .char_indices()
            .nth(10)
            .map(|(idx, _)| idx)
            .unwrap_or(self.token.len());
        &self.token[..end]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub sn: String,
    /// Activation time in epoch seconds.
    #[serde(default)]
    pub a: i64,
}

/// Status value the vendor uses for a connection with a live sensor.
pub const CONNECTION_STATUS_ACTIVE: i32 = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub sensor: Sensor,
}

impl Connection {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlucoseItem {
    /// Sensor clock reading, `M/D/YYYY h:mm:ss AM|PM`.
    pub factory_timestamp: String,
    #[serde(default)]
    pub timestamp: String,
    pub value_in_mg_per_dl: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConnection {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub glucose_measurement: Option<GlucoseItem>,
}

/// A patient's recent glucose series as served by the graph endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    #[serde(default)]
    pub connection: GraphConnection,
    #[serde(default)]
    pub graph_data: Vec<GlucoseItem>,
}

/// Envelope shared by every LibreLinkUp response.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorEnvelope<T> {
    #[serde(default)]
    pub status: i32,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub auth_ticket: Option<AuthTicket>,
    #[serde(default)]
    pub redirect: bool,
    pub region: Option<String>,
}
