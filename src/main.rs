/// Entry point for Creo Restart Watch.
///
/// Watches the lifecycle events of a container runtime and raises a
/// notification whenever a container restarts too often within the configured
/// window.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid configuration or an
/// unreachable runtime socket) or if the runtime's event stream fails.
///
/// # Examples
///
/// ```bash
/// RESTART_COUNT=3 RESTART_WINDOW=5m VIOLATION_LIMIT=1h RUST_LOG=info cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_restart_watch::run().await
}
