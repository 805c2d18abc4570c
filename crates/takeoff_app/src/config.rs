use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use takeoff_engine::BackendSettings;

use crate::logging::LogDestination;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "takeoff",
    version,
    about = "Follow a takeoff pipeline run and review its counts from the console"
)]
pub struct Config {
    /// Project to review
    #[arg(long, env = "TAKEOFF_PROJECT")]
    pub project: String,

    /// Backend base URL
    #[arg(long, env = "TAKEOFF_API_URL", default_value = "http://127.0.0.1:8000")]
    pub api_url: String,

    /// Directory holding saved review marks
    #[arg(long, env = "TAKEOFF_STATE_DIR", default_value = ".")]
    pub state_dir: PathBuf,

    /// Where log lines go
    #[arg(long, env = "TAKEOFF_LOG", value_enum, default_value_t = LogDestination::File)]
    pub log: LogDestination,

    /// Log at debug level
    #[arg(short, long, env = "TAKEOFF_VERBOSE")]
    pub verbose: bool,

    /// Timeout for each backend call, in seconds (the progress stream is exempt)
    #[arg(long, env = "TAKEOFF_REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.api_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..BackendSettings::default()
        }
    }
}
