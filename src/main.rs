// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stream_recorder::config::{
    apply_env_overrides, load_config, LoggingConfig, RecorderConfig, StreamConfig, ZenohConfig,
};
use stream_recorder::{RecorderManager, ZenohSource};

/// Stream Recorder - Record live Zenoh streams to segmented files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Extra stream to record, as <path_name>=<key_expr> (repeatable)
    #[arg(short, long)]
    stream: Vec<String>,

    /// Validate the configuration, print it and exit
    #[arg(long)]
    validate: bool,
}

fn parse_stream_arg(arg: &str) -> Result<StreamConfig> {
    let Some((path_name, key_expr)) = arg.split_once('=') else {
        bail!("--stream expects <path_name>=<key_expr>, got '{}'", arg);
    };
    Ok(StreamConfig {
        path_name: path_name.trim().to_string(),
        key_expr: key_expr.trim().to_string(),
    })
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid logging.level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

fn zenoh_config(config: &ZenohConfig) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    zenoh_config
        .insert_json5("mode", &serde_json::to_string(&config.mode)?)
        .map_err(|e| anyhow::anyhow!("Invalid zenoh.mode: {}", e))?;

    if let Some(connect) = &config.connect {
        zenoh_config
            .insert_json5("connect/endpoints", &serde_json::to_string(&connect.endpoints)?)
            .map_err(|e| anyhow::anyhow!("Invalid zenoh.connect endpoints: {}", e))?;
    }

    if let Some(listen) = &config.listen {
        zenoh_config
            .insert_json5("listen/endpoints", &serde_json::to_string(&listen.endpoints)?)
            .map_err(|e| anyhow::anyhow!("Invalid zenoh.listen endpoints: {}", e))?;
    }

    Ok(zenoh_config)
}

fn resolve_config(args: &Args) -> Result<RecorderConfig> {
    let mut config = load_config(&args.config)?;
    for arg in &args.stream {
        config.streams.push(parse_stream_arg(arg)?);
    }
    apply_env_overrides(&mut config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    if args.validate {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_logging(&config.logging)?;

    info!("Starting Stream Recorder");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Path format: {}", config.record.path_format);

    if config.streams.is_empty() {
        bail!("No streams configured; add streams to the config file or pass --stream");
    }

    let session = zenoh::open(zenoh_config(&config.zenoh)?)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;

    info!("Zenoh session opened");

    let manager = RecorderManager::new(config.record.clone());
    for stream in &config.streams {
        let source = Arc::new(ZenohSource::new(session.clone(), stream.key_expr.clone()));
        if let Err(e) = manager.start_stream(&stream.path_name, source) {
            error!("Failed to start recording '{}': {:#}", stream.path_name, e);
        }
    }

    if manager.active_streams().is_empty() {
        bail!("No stream could be started");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down");

    manager.shutdown().await?;
    if let Err(e) = session.close().await {
        error!("Failed to close Zenoh session: {}", e);
    }
    info!("Stream Recorder shut down successfully");

    Ok(())
}
