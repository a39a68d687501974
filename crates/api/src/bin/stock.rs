//! Stock service entry point.

use api::config::Service;

#[tokio::main]
async fn main() {
    if let Err(e) = api::server::run(Service::Stock).await {
        tracing::error!(error = %e, "stock service failed");
        eprintln!("stock service failed: {e}");
        std::process::exit(1);
    }
}
