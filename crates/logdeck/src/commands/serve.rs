//! Serve command implementation

use anyhow::Result;
use tracing::info;

use super::{build_engine, load_config, GlobalOpts};
use crate::cli::ServeArgs;

pub async fn execute(opts: &GlobalOpts, args: ServeArgs) -> Result<()> {
    let mut config = load_config(opts)?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(static_dir) = args.static_dir {
        config.static_dir = static_dir;
    }
    if args.cors_origin.is_some() {
        config.cors_origin = args.cors_origin;
    }

    let engine = build_engine(&config)?;
    info!(
        "Serving {} sources from {}",
        engine.sources().len(),
        config
            .log_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "configured paths".to_string())
    );

    logdeck_web::start_server(&config, engine).await?;
    Ok(())
}
