// oncograph-server - HTTP front end for the question answering pipeline
//
// Usage: oncograph-server [CONFIG.toml]
// The config path may also come from ONCOGRAPH_CONFIG. Environment
// variables override file values.

use std::path::PathBuf;
use std::process;

use oncograph::server::{serve, AppState};
use oncograph::setup::build_engine;
use oncograph::Settings;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod exit_codes {
    pub const CONFIG_ERROR: i32 = 1;
    pub const SERVER_ERROR: i32 = 2;
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "oncograph=info,tower_http=info".into()),
        )
        .init();

    info!("Starting oncograph server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ONCOGRAPH_CONFIG").ok())
        .map(PathBuf::from);

    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    let engine = match build_engine(&settings) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to build query engine: {}", e);
            process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    if let Err(e) = serve(AppState::new(engine), &settings.server).await {
        error!("Server stopped: {}", e);
        process::exit(exit_codes::SERVER_ERROR);
    }
}
