use blessing_core::{init_logging, JsonDocumentStore};
use blessing_server::{run, ServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    if let Some(log_dir) = config.log_dir.as_deref() {
        init_logging(&config.log_level, log_dir)?;
    }

    let store = Arc::new(JsonDocumentStore::new(&config.document_path));
    let listener = TcpListener::bind(config.bind).await?;
    println!(
        "blessing_server listening on http://{} (document={})",
        listener.local_addr()?,
        config.document_path.display()
    );
    run(listener, store, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        eprintln!("blessing_server cannot listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}
