// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::sync::Arc;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use deskpilot_loops::{default_registry, Capability};
use deskpilot_model::HttpCompletionClient;
use deskpilot_serve::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let client = Arc::new(HttpCompletionClient::new());

    match cli.command {
        Commands::Serve { addr, api_key } => {
            let state = Arc::new(AppState { client, api_key });
            deskpilot_serve::serve(addr, state).await
        }
        Commands::Loops => {
            let registry = default_registry(client);
            for info in registry.list() {
                let caps: Vec<&str> = info
                    .capabilities
                    .iter()
                    .map(|c| match c {
                        Capability::Step => "step",
                        Capability::Click => "click",
                    })
                    .collect();
                println!(
                    "{:<18} priority {:>2}  [{}]  {}",
                    info.name,
                    info.priority,
                    caps.join(", "),
                    info.pattern
                );
            }
            Ok(())
        }
        Commands::Predict { model, instruction, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading screenshot {}", image.display()))?;
            let image_b64 = B64.encode(bytes);

            let registry = default_registry(client);
            let strategy = registry
                .dispatch(&model)
                .with_context(|| format!("no agent loop matches model '{model}'"))?;
            match strategy.predict_click(&model, &image_b64, &instruction).await? {
                Some((x, y)) => println!("{}", serde_json::json!({ "x": x, "y": y })),
                None => println!("{}", serde_json::json!({ "error": "no coordinate found" })),
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
