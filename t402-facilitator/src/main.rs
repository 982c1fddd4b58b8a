//! Production-ready t402 facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in the current directory)
//! cargo run -p t402-facilitator --release
//!
//! # Run with a custom config path
//! CONFIG=/path/to/config.toml cargo run -p t402-facilitator
//!
//! # Configure logging
//! RUST_LOG=info cargo run -p t402-facilitator
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — path to the TOML configuration file (default: `config.toml`)
//! - `HOST` — override bind address (default: `0.0.0.0`)
//! - `PORT` — override port (default: `4022`)
//! - `RUST_LOG` — log level filter (default: `info`)
//! - Chain signer keys referenced as `$VAR` in the config file

use t402_facilitator::run;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    #[cfg(feature = "telemetry")]
    if let Err(e) = t402_facilitator::telemetry::init() {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        #[cfg(feature = "telemetry")]
        tracing::error!("Facilitator failed: {e}");
        #[cfg(not(feature = "telemetry"))]
        eprintln!("Facilitator failed: {e}");
        std::process::exit(1);
    }
}
