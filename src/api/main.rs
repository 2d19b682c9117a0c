use anyhow::Result;
use clap::Parser;

#[path = "../agent/mod.rs"]
mod agent;
#[path = "../api/mod.rs"]
mod api;
#[path = "../shared/mod.rs"]
mod shared;

#[derive(Parser)]
#[command(name = "dworks-api")]
#[command(about = "DataWorks automation agent - classifies tasks onto operations and runs them")]
struct Args {
    /// Bind host
    #[arg(long, env = "DWORKS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(long, env = "DWORKS_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory for service logs
    #[arg(long, env = "DWORKS_LOG_DIR", default_value = "./logs")]
    log_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize service logging
    let _ = shared::logging::init_service_logging(&args.log_dir, "dworks_api");

    // Run the API server
    api::rest::api::run_rest_server(&args.host, args.port).await
}
