use azure_keyvault_provisioning::{run_example, ProvisioningError};
use dotenvy::dotenv;
use std::process;
use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = tokio::select! {
        result = run_example() => result,
        _ = tokio::signal::ctrl_c() => Err(ProvisioningError::Cancelled),
    };

    if let Err(e) = result {
        eprintln!("{}", e.report());
        process::exit(1);
    }
}
