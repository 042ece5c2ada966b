use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::warn;

/// HTTP client shared by the vendor, identity and FHIR clients of one daemon.
pub fn build_client(request_timeout: Duration, connect_timeout: Duration) -> Client {
    finish_client(
        ClientBuilder::new()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout),
    )
}

pub(crate) fn finish_client(builder: ClientBuilder) -> Client {
    match builder.build() {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "HTTP client setup failed, falling back to a client without timeouts");
            Client::new()
        }
    }
}
