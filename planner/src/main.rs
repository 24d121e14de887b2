mod cli;
mod history;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout queda reservado para el JSON de tareas; los logs van a stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("planner=info,common=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run().await
}
