//! Cart service entry point.

use api::config::Service;

#[tokio::main]
async fn main() {
    if let Err(e) = api::server::run(Service::Cart).await {
        tracing::error!(error = %e, "cart service failed");
        eprintln!("cart service failed: {e}");
        std::process::exit(1);
    }
}
