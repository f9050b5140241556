//! x402 facilitator for the `exact` scheme on EVM chains.
//!
//! Endpoints:
//! - `GET /verify`: shape of the verify body
//! - `POST /verify`: check a payment against its requirements
//! - `GET /settle`: shape of the settle body
//! - `POST /settle`: settle an accepted payment on-chain
//! - `GET /supported`: payment kinds and signer addresses
//! - `GET /health`: liveness
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` path of the JSON config, `config.json` by default
//! - `HOST`, `PORT` control the binding address when the config omits them
//! - `RUST_LOG` filters logs, `info` by default
//! - `OTEL_*` variables export traces and metrics when built with `telemetry`

mod chain;
mod config;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
