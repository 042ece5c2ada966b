use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// LibreLinkUp API hosts keyed by account region.
pub const LLU_API_ENDPOINTS: [(&str, &str); 12] = [
    ("AE", "api-ae.libreview.io"),
    ("AP", "api-ap.libreview.io"),
    ("AU", "api-au.libreview.io"),
    ("CA", "api-ca.libreview.io"),
    ("DE", "api-de.libreview.io"),
    ("EU", "api-eu.libreview.io"),
    ("EU2", "api-eu2.libreview.io"),
    ("FR", "api-fr.libreview.io"),
    ("JP", "api-jp.libreview.io"),
    ("US", "api-us.libreview.io"),
    ("LA", "api-la.libreview.io"),
    ("RU", "api.libreview.ru"),
];

pub const DEFAULT_REGION: &str = "EU";

/// Resolves a region code to its API host. Unknown regions fall back to EU.
pub fn libre_link_up_host(region: &str) -> &'static str {
    let wanted = region.trim().to_ascii_uppercase();
    LLU_API_ENDPOINTS
        .iter()
        .find(|(code, _)| *code == wanted)
        .or_else(|| LLU_API_ENDPOINTS.iter().find(|(code, _)| *code == DEFAULT_REGION))
        .map(|(_, host)| *host)
        .unwrap_or("api-eu.libreview.io")
}

#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub username: String,
    pub password: String,
    pub region: String,
    pub version: String,
    pub product: String,
    pub user_agent: String,
}

impl VendorConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}", libre_link_up_host(&self.region))
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            region: DEFAULT_REGION.to_string(),
            version: "4.7.0".to_string(),
            product: "llu.ios".to_string(),
            user_agent: "FreeStyle LibreLink Up FHIR Uploader".to_string(),
        }
    }
}

/// Client-credentials settings for the identity provider (e.g. Keycloak).
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub vendor: VendorConfig,
    pub identity: IdentityConfig,
    pub fhir_url: String,
    /// Subject id used when bundles are written to disk instead of uploaded.
    pub fhir_patient_id: String,
    pub interval: Duration,
    pub single_shot: bool,
    pub demo_enabled: bool,
    pub demo_source_path: PathBuf,
    pub output_dir: PathBuf,
    pub log_level: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            vendor: VendorConfig::default(),
            identity: IdentityConfig::default(),
            fhir_url: String::new(),
            fhir_patient_id: String::new(),
            interval: Duration::from_secs(60),
            single_shot: false,
            demo_enabled: false,
            demo_source_path: PathBuf::from("./demo/data/response_data.json"),
            output_dir: PathBuf::from("./demo/data"),
            log_level: "info".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Reads the process environment. Missing variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).unwrap_or_default();
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let interval_minutes = lookup("LINK_UP_TIME_INTERVAL")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|m| *m > 0)
            .unwrap_or(1);

        Self {
            vendor: VendorConfig {
                username: text("LINK_UP_USERNAME"),
                password: text("LINK_UP_PASSWORD"),
                region: lookup("LINK_UP_REGION").unwrap_or_else(|| defaults.vendor.region.clone()),
                ..defaults.vendor
            },
            identity: IdentityConfig {
                token_endpoint: text("TOKEN_ENDPOINT"),
                client_id: text("CLIENT_ID"),
                client_secret: text("CLIENT_SECRET"),
                scope: text("SCOPE"),
            },
            fhir_url: text("FHIR_URL"),
            fhir_patient_id: text("FHIR_ID"),
            interval: Duration::from_secs(interval_minutes * 60),
            single_shot: flag("SINGLE_SHOT"),
            demo_enabled: flag("DEMO_ENABLED"),
            demo_source_path: lookup("DEMO_SOURCE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.demo_source_path),
            output_dir: lookup("BUNDLE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            request_timeout: defaults.request_timeout,
            connect_timeout: defaults.connect_timeout,
        }
    }
}
