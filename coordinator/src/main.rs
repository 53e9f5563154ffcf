use std::{env, sync::Arc};

use coordinator::{Runtime, SessionConfig, server};
use log::info;
use tokio::{net::TcpListener, signal};
use worker::TcpConnector;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8100";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string()),
    );

    let config = match env::var("CONFIG") {
        Ok(path) => {
            info!("loading config from {path}");
            SessionConfig::from_file(&path)?
        }
        Err(_) => SessionConfig::default(),
    };

    let runtime = Arc::new(Runtime::init(config, Arc::new(TcpConnector))?);
    let listener = TcpListener::bind(&addr).await?;

    tokio::select! {
        ret = server::serve(listener, Arc::clone(&runtime)) => ret?,
        _ = signal::ctrl_c() => info!("received SIGTERM"),
    }

    runtime.shutdown().await;
    Ok(())
}
