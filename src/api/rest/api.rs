use anyhow::Result;
use std::fs;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::builtin_tools::build_registry;
use crate::agent::config::AgentConfig;
use crate::agent::dispatcher::Dispatcher;
use crate::agent::executor::SubprocessExecutor;
use crate::agent::inference::InferenceClient;
use crate::agent::paths::PathGuard;
use crate::api::rest::create_router;
use crate::api::rest::state::AppState;

pub async fn run_rest_server(host: &str, port: u16) -> Result<()> {
    // Write PID file for process management
    let pid = process::id();
    let pid_file = "/tmp/dworks.pid";

    if let Err(e) = fs::write(pid_file, pid.to_string()) {
        warn!("Could not write PID file: {}", e);
    }

    // Set up cleanup on exit
    let pid_file_cleanup = pid_file.to_string();
    ctrlc::set_handler(move || {
        info!("Shutting down DataWorks API...");
        let _ = fs::remove_file(&pid_file_cleanup);
        std::process::exit(0);
    })?;

    info!("Starting DataWorks REST API service... PID: {}", pid);

    let config = Arc::new(AgentConfig::from_env()?);
    info!(
        "Data root: {} | max iterations: {} | script timeout: {}s",
        config.data_root.display(),
        config.max_iterations,
        config.script_timeout.as_secs()
    );

    if let Err(e) = fs::create_dir_all(&config.data_root) {
        warn!(
            "Failed to create data root {}: {}",
            config.data_root.display(),
            e
        );
    }

    let guard = PathGuard::new(config.data_root.clone());
    let model = Arc::new(InferenceClient::new(&config)?);
    let executor = Arc::new(SubprocessExecutor::new(config.script_timeout));

    let registry = Arc::new(build_registry(
        config.clone(),
        model.clone(),
        executor,
        guard.clone(),
    ));
    info!("Registered {} operations", registry.list().len());

    let state = Arc::new(AppState {
        dispatcher: Dispatcher::new(model, registry),
        guard,
    });

    info!("Building REST API routes...");
    let app = create_router(state);

    let bind_addr = format!("{host}:{port}");
    info!("Binding to: {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("API started successfully!");
    info!("Ready to accept requests on http://{}", bind_addr);

    let rest_server_result = axum::serve(listener, app).await;

    // Clean up PID file on exit
    let _ = fs::remove_file(pid_file);

    rest_server_result?;
    Ok(())
}
