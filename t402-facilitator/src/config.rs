//! Facilitator server configuration.
//!
//! Loaded from a TOML file with `$VAR` / `${VAR}` environment variable
//! expansion in string values, plus `HOST` / `PORT` overrides from the
//! environment.
//!
//! # Example
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4022
//! deploy_erc4337_with_eip6492 = false
//!
//! [chains."eip155:84532"]
//! rpc_url = "https://sepolia.base.org"
//! signer_private_key = "$EVM_PRIVATE_KEY"
//! receipt_timeout_secs = 30
//!
//! [chains."solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1"]
//! rpc_url = "https://api.devnet.solana.com"
//! signer_keypair = "$SVM_PRIVATE_KEY"
//! confirm_attempts = 60
//! confirm_interval_ms = 1000
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default receipt timeout for EVM settlement, in seconds.
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 30;

/// Top-level facilitator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Server bind address (default `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default `4022`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Chain configurations keyed by CAIP-2 network identifier.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,

    /// Whether EIP-6492 smart-wallet signatures may be validated and
    /// settled via the factory predeploy path.
    #[serde(default)]
    pub deploy_erc4337_with_eip6492: bool,
}

/// Per-chain configuration; the CAIP-2 namespace of the key decides which
/// fields apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// HTTP RPC endpoint URL.
    pub rpc_url: String,

    /// EVM signer private key (hex). Supports `$VAR` expansion.
    #[serde(default)]
    pub signer_private_key: Option<String>,

    /// Solana fee-payer keypair (base58). Supports `$VAR` expansion.
    #[serde(default)]
    pub signer_keypair: Option<String>,

    /// Whether the chain supports EIP-1559 gas pricing (default true).
    #[serde(default = "default_true")]
    pub eip1559: bool,

    /// How long to wait for an EVM settlement receipt, in seconds.
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,

    /// Solana confirmation polling attempts (default 60).
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: usize,

    /// Solana confirmation polling interval in milliseconds (default 1000).
    #[serde(default = "default_confirm_interval_ms")]
    pub confirm_interval_ms: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4022
}

fn default_true() -> bool {
    true
}

fn default_receipt_timeout() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_SECS
}

fn default_confirm_attempts() -> usize {
    60
}

fn default_confirm_interval_ms() -> u64 {
    1_000
}

impl FacilitatorConfig {
    /// Loads configuration from the `CONFIG` env var path, falling back to
    /// `config.toml`, applying env expansion and `HOST`/`PORT` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    ///
    /// A missing file yields the default configuration (no chains).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };
        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse()
        {
            config.port = port;
        }
        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` patterns from the process environment.
///
/// Unresolved variables are left as-is so startup can report them.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut var_name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }
        if var_name.is_empty() {
            result.push('$');
            if braced {
                result.push('{');
            }
        } else if let Ok(value) = std::env::var(&var_name) {
            result.push_str(&value);
        } else {
            result.push('$');
            if braced {
                result.push('{');
            }
            result.push_str(&var_name);
            if braced {
                result.push('}');
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chain_tables() {
        let toml = r#"
            port = 4022
            deploy_erc4337_with_eip6492 = true

            [chains."eip155:84532"]
            rpc_url = "https://sepolia.base.org"
            signer_private_key = "0xkey"

            [chains."solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1"]
            rpc_url = "https://api.devnet.solana.com"
            signer_keypair = "base58key"
            confirm_attempts = 30
        "#;
        let config: FacilitatorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.port, 4022);
        assert!(config.deploy_erc4337_with_eip6492);
        let evm = &config.chains["eip155:84532"];
        assert_eq!(evm.signer_private_key.as_deref(), Some("0xkey"));
        assert_eq!(evm.receipt_timeout_secs, DEFAULT_RECEIPT_TIMEOUT_SECS);
        let svm = &config.chains["solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1"];
        assert_eq!(svm.confirm_attempts, 30);
        assert_eq!(svm.confirm_interval_ms, 1_000);
    }

    #[test]
    fn expands_env_vars() {
        // SAFETY: test-local variable, no concurrent env access in this test binary.
        unsafe { std::env::set_var("T402_TEST_KEY", "sekrit") };
        let expanded = expand_env_vars("key = \"$T402_TEST_KEY\" other = \"${MISSING_VAR}\"");
        assert_eq!(expanded, "key = \"sekrit\" other = \"${MISSING_VAR}\"");
    }
}
