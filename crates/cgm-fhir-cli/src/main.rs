use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cgm_fhir_core::http::build_client;
use cgm_fhir_core::mapper::map_connection_to_device;
use cgm_fhir_core::{
    ClientCredentialsClient, FhirClient, LibreLinkUpClient, PatientOutcome, SessionContext, SyncConfig,
    SyncSettings, Synchronizer, VendorApi, VendorHeaders,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod demo;
mod scheduler;

type LiveSynchronizer = Synchronizer<LibreLinkUpClient, ClientCredentialsClient, FhirClient>;

#[derive(Debug, Parser)]
#[command(name = "cgm-fhird")]
#[command(about = "LibreLinkUp glucose readings to FHIR Observations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Overrides LINK_UP_TIME_INTERVAL.
    #[arg(long)]
    interval_minutes: Option<u64>,

    /// Overrides BUNDLE_OUTPUT_DIR.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run a single sync tick and exit
    Once,
    /// Sync on a fixed interval until ctrl-c
    Run,
    /// Map a recorded vendor response to a bundle file
    Demo {
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Log in and print the Device resource of every connection
    Connections,
}

/// Mode picked from DEMO_ENABLED / SINGLE_SHOT when no subcommand is given.
fn default_command(config: &SyncConfig) -> Command {
    if config.demo_enabled {
        Command::Demo { source: None }
    } else if config.single_shot {
        Command::Once
    } else {
        Command::Run
    }
}

fn build_synchronizer(config: &SyncConfig) -> LiveSynchronizer {
    let http = build_client(config.request_timeout, config.connect_timeout);

    let vendor = LibreLinkUpClient::new(
        http.clone(),
        config.vendor.base_url(),
        config.vendor.username.clone(),
        config.vendor.password.clone(),
    );
    let identity = ClientCredentialsClient::new(http.clone(), config.identity.clone());
    let fhir = FhirClient::new(http, config.fhir_url.clone());

    Synchronizer::new(
        vendor,
        identity,
        fhir,
        SessionContext::new(VendorHeaders::new(&config.vendor)),
        SyncSettings {
            fhir_patient_id: config.fhir_patient_id.clone(),
            output_dir: config.output_dir.clone(),
        },
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = SyncConfig::from_env();
    if let Some(minutes) = cli.interval_minutes.filter(|m| *m > 0) {
        config.interval = Duration::from_secs(minutes * 60);
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .compact()
        .init();

    info!(
        region = %config.vendor.region,
        interval_secs = config.interval.as_secs(),
        fhir_configured = !config.fhir_url.is_empty(),
        output_dir = %config.output_dir.display(),
        "configuration loaded"
    );
    if config.fhir_url.is_empty() {
        warn!("FHIR_URL not set, uploads will fail until it is configured");
    }

    let command = cli.command.unwrap_or_else(|| default_command(&config));
    match command {
        Command::Demo { source } => {
            info!("demo enabled");
            let source = source.unwrap_or_else(|| config.demo_source_path.clone());
            demo::run_demo(&source, &config.fhir_patient_id, &config.output_dir)?;
        }
        Command::Connections => {
            print_devices(&config).await?;
        }
        Command::Once => {
            info!("running only once");
            let sync = build_synchronizer(&config);
            let report = sync.tick().await;
            for patient in &report.patients {
                print_patient(&patient.patient_id, &patient.outcome);
            }
        }
        Command::Run => {
            let sync = Arc::new(build_synchronizer(&config));
            scheduler::run_scheduler(sync, config.interval).await?;
        }
    }

    Ok(())
}

async fn print_devices(config: &SyncConfig) -> Result<()> {
    let client = LibreLinkUpClient::new(
        build_client(config.request_timeout, config.connect_timeout),
        config.vendor.base_url(),
        config.vendor.username.clone(),
        config.vendor.password.clone(),
    );
    let mut session = SessionContext::new(VendorHeaders::new(&config.vendor));
    let ticket = client.login(&session).await?;
    session.replace_ticket(ticket);

    let devices = client
        .connections(&session)
        .await?
        .iter()
        .map(map_connection_to_device)
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}

fn print_patient(patient_id: &str, outcome: &PatientOutcome) {
    let summary = match outcome {
        PatientOutcome::Uploaded(count) => format!("uploaded {count} observations"),
        PatientOutcome::NothingNew => "nothing new".to_string(),
        PatientOutcome::Saved(path) => format!("saved {}", path.display()),
        PatientOutcome::SeriesUnavailable(reason) => format!("no series ({reason})"),
        PatientOutcome::UploadFailed(reason) => format!("upload failed ({reason})"),
        PatientOutcome::SaveFailed(reason) => format!("save failed ({reason})"),
    };
    println!("{patient_id:<40} {summary}");
}
