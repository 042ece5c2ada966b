pub mod config;
pub mod fhir;
pub mod http;
pub mod identity;
pub mod mapper;
pub mod persist;
pub mod readings;
pub mod resources;
pub mod session;
pub mod sync;
pub mod vendor;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod sync_tests;

pub use config::{IdentityConfig, SyncConfig, VendorConfig};
pub use fhir::{FhirApi, FhirClient, FhirError, UploadOutcome};
pub use identity::{ClientCredentialsClient, IdentityError, IdentityProvider};
pub use readings::{AuthTicket, Connection, GlucoseItem, GraphData, Sensor};
pub use resources::{Bundle, Device, DeviceStatus, Observation};
pub use session::{SessionContext, VendorHeaders};
pub use sync::{Destination, PatientOutcome, PatientReport, SyncSettings, Synchronizer, TickOutcome, TickReport};
pub use vendor::{LibreLinkUpClient, VendorApi, VendorError};
