//! Products service entry point.

use api::config::Service;

#[tokio::main]
async fn main() {
    if let Err(e) = api::server::run(Service::Products).await {
        tracing::error!(error = %e, "products service failed");
        eprintln!("products service failed: {e}");
        std::process::exit(1);
    }
}
