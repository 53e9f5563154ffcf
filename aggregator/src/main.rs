use std::{env, path::PathBuf};

use aggregator::{Aggregator, DEFAULT_NAME, Node};
use anyhow::{Context, bail};
use log::{info, warn};
use machine_learning::{arch::Mlp, optimization::GradientDescent};
use tokio::signal;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8091";
const DEFAULT_LEARNING_RATE: f64 = 0.3;

/// Parses a comma separated list of layer sizes, e.g. `"16,15,8,1"`.
fn parse_arch(arch: &str) -> anyhow::Result<Vec<usize>> {
    arch.split(',')
        .map(|s| {
            s.trim()
                .parse()
                .with_context(|| format!("invalid layer size {s:?} in ARCH"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string()),
    );
    let name = env::var("NAME").unwrap_or_else(|_| DEFAULT_NAME.to_string());

    let Ok(arch) = env::var("ARCH") else {
        bail!("ARCH must list the layer sizes, e.g. ARCH=16,15,8,1");
    };
    let sizes = parse_arch(&arch)?;

    let learning_rate = match env::var("LEARNING_RATE") {
        Ok(lr) => lr.parse().context("invalid LEARNING_RATE")?,
        Err(_) => DEFAULT_LEARNING_RATE,
    };

    let model = match env::var("WEIGHTS") {
        Ok(path) => {
            info!("loading weights from {path}");
            Mlp::read_weights(&path, sizes.clone())?
        }
        Err(_) => Mlp::random(sizes.clone(), None)?,
    };

    let (handle, _task) = Aggregator::new(model, GradientDescent::new(learning_rate)).spawn();

    let node = Node::bind(&addr).await?;
    node.insert(name.clone(), handle.clone());
    info!("serving {}", node.addr_of(&name)?);

    tokio::select! {
        ret = node.serve() => ret?,
        _ = signal::ctrl_c() => info!("received SIGTERM"),
    }

    if let Ok(path) = env::var("WEIGHTS_OUT") {
        let path = PathBuf::from(path);
        match handle.get_global_weights().await {
            Ok(snapshot) => {
                Mlp::from_layers(sizes, snapshot.layers)?.write_weights(&path)?;
                info!("weights written to {}", path.display());
            }
            Err(e) => warn!("could not read the final weights: {e}"),
        }
    }

    Ok(())
}
