use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::config::VendorConfig;
use crate::readings::AuthTicket;

/// Static header set sent to the vendor API. Bearer headers are derived per
/// request from the session ticket, the base set is never mutated.
#[derive(Debug, Clone)]
pub struct VendorHeaders {
    base: Vec<(&'static str, String)>,
}

impl VendorHeaders {
    pub fn new(config: &VendorConfig) -> Self {
        Self {
            base: vec![
                ("user-agent", config.user_agent.clone()),
                ("content-type", "application/json".to_string()),
                ("version", config.version.clone()),
                ("product", config.product.clone()),
                ("connection", "keep-alive".to_string()),
                ("pragma", "no-cache".to_string()),
                ("cache-control", "no-cache".to_string()),
            ],
        }
    }

    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.base.len() + 1);
        for (name, value) in &self.base {
            if let Ok(value) = HeaderValue::from_str(value) {
                map.insert(HeaderName::from_static(*name), value);
            }
        }
        map
    }

    pub fn authorized(&self, ticket: &AuthTicket) -> HeaderMap {
        let mut map = self.header_map();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", ticket.token)) {
            map.insert(AUTHORIZATION, value);
        }
        map
    }
}

/// Everything a tick carries between steps: the vendor headers, the last
/// vendor ticket and the identity token obtained for the current tick.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub headers: VendorHeaders,
    pub ticket: Option<AuthTicket>,
    pub identity_token: Option<String>,
}

impl SessionContext {
    pub fn new(headers: VendorHeaders) -> Self {
        Self {
            headers,
            ticket: None,
            identity_token: None,
        }
    }

    pub fn has_valid_ticket(&self, now_secs: i64) -> bool {
        self.ticket
            .as_ref()
            .map(|ticket| ticket.is_valid_at(now_secs))
            .unwrap_or(false)
    }

    /// Drops both credentials before a re-login.
    pub fn clear(&mut self) {
        self.ticket = None;
        self.identity_token = None;
    }

    pub fn replace_ticket(&mut self, ticket: AuthTicket) {
        self.ticket = Some(ticket);
    }
}
