//! Orders service entry point.

use api::config::Service;

#[tokio::main]
async fn main() {
    if let Err(e) = api::server::run(Service::Orders).await {
        tracing::error!(error = %e, "orders service failed");
        eprintln!("orders service failed: {e}");
        std::process::exit(1);
    }
}
