//! Facilitator startup: chain wiring and the HTTP server loop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use tower_http::cors;

use t402::local::FacilitatorLocal;
use t402::networks::NetworkRegistry;
use t402::scheme::SchemeRegistry;

use crate::config::{ChainConfig, FacilitatorConfig};
use crate::handlers::facilitator_router;

/// Starts the facilitator: loads configuration, wires chain providers into
/// the scheme registry, and serves until ctrl-c or SIGTERM.
///
/// # Errors
///
/// Returns an error when configuration, chain wiring, or binding fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the rustls crypto provider used by the HTTP stacks.
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .map_err(|_| "failed to install rustls crypto provider")?;

    let config = FacilitatorConfig::load()?;
    #[cfg(feature = "telemetry")]
    tracing::info!(
        host = %config.host,
        port = config.port,
        chains = config.chains.len(),
        "Loaded configuration"
    );
    if config.chains.is_empty() {
        #[cfg(feature = "telemetry")]
        tracing::warn!("No chains configured; the facilitator will report no supported kinds");
    }

    let mut registry = SchemeRegistry::new();
    let mut networks = NetworkRegistry::new();
    #[cfg(feature = "chain-eip155")]
    networks.register(t402_evm::networks::EVM_NETWORKS);
    #[cfg(feature = "chain-solana")]
    networks.register(t402_svm::networks::SOLANA_NETWORKS);

    for (network_id, chain_config) in &config.chains {
        let Ok(chain_id) = network_id.parse::<t402::chain::ChainId>() else {
            #[cfg(feature = "telemetry")]
            tracing::warn!(network = %network_id, "Skipping chain: invalid CAIP-2 identifier");
            continue;
        };
        match chain_id.namespace() {
            #[cfg(feature = "chain-eip155")]
            "eip155" => register_eip155(&mut registry, &config, &chain_id, chain_config)?,
            #[cfg(feature = "chain-solana")]
            "solana" => register_solana(&mut registry, &chain_id, chain_config)?,
            _other => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(network = %network_id, "Skipping chain: unsupported namespace");
            }
        }
    }

    let facilitator = FacilitatorLocal::new(registry, networks);
    let state = Arc::new(facilitator);

    let app = Router::new().merge(facilitator_router(state)).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    #[cfg(feature = "telemetry")]
    tracing::info!("Facilitator listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    #[cfg(feature = "telemetry")]
    tracing::info!("Facilitator shut down gracefully");
    Ok(())
}

#[cfg(feature = "chain-eip155")]
fn register_eip155(
    registry: &mut SchemeRegistry,
    config: &FacilitatorConfig,
    chain_id: &t402::chain::ChainId,
    chain_config: &ChainConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    use alloy_network::EthereumWallet;
    use alloy_signer_local::PrivateKeySigner;
    use t402::scheme::ExactScheme;
    use t402_evm::chain::{Eip155ChainProvider, Eip155ChainReference};
    use t402_evm::exact::{ExactEvmConfig, V1Eip155ExactFacilitator, V2Eip155ExactFacilitator};

    let Some(key) = resolved_secret(chain_config.signer_private_key.as_deref()) else {
        #[cfg(feature = "telemetry")]
        tracing::warn!(
            network = %chain_id,
            "Skipping chain: signer_private_key not resolved (missing env var?)"
        );
        return Ok(());
    };
    let signer: PrivateKeySigner = key
        .parse()
        .map_err(|e| format!("invalid signer key for {chain_id}: {e}"))?;
    let wallet = EthereumWallet::from(signer);
    let rpc_url: url::Url = chain_config
        .rpc_url
        .parse()
        .map_err(|e| format!("invalid RPC URL for {chain_id}: {e}"))?;

    let chain = Eip155ChainReference::try_from(chain_id)?;
    let provider = Arc::new(Eip155ChainProvider::new(
        chain,
        wallet,
        &[(rpc_url, None)],
        chain_config.eip1559,
        chain_config.receipt_timeout_secs,
    )?);
    let evm_config = ExactEvmConfig {
        deploy_erc4337_with_eip6492: config.deploy_erc4337_with_eip6492,
    };

    registry.register(
        2,
        ExactScheme::NAME,
        &[chain_id.clone()],
        Arc::new(V2Eip155ExactFacilitator::new(
            Arc::clone(&provider),
            evm_config,
        )),
    );
    registry.register(
        1,
        ExactScheme::NAME,
        &[chain_id.clone()],
        Arc::new(V1Eip155ExactFacilitator::new(provider, evm_config)),
    );
    #[cfg(feature = "telemetry")]
    tracing::info!(network = %chain_id, "Registered EVM exact scheme");
    Ok(())
}

#[cfg(feature = "chain-solana")]
fn register_solana(
    registry: &mut SchemeRegistry,
    chain_id: &t402::chain::ChainId,
    chain_config: &ChainConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    use solana_keypair::Keypair;
    use t402::scheme::ExactScheme;
    use t402_svm::chain::{SolanaChainProvider, SolanaChainReference};
    use t402_svm::exact::{V1SolanaExactFacilitator, V2SolanaExactFacilitator};

    let Some(keypair) = resolved_secret(chain_config.signer_keypair.as_deref()) else {
        #[cfg(feature = "telemetry")]
        tracing::warn!(
            network = %chain_id,
            "Skipping chain: signer_keypair not resolved (missing env var?)"
        );
        return Ok(());
    };
    let keypair = Keypair::from_base58_string(&keypair);

    let chain = SolanaChainReference::try_from(chain_id)?;
    let provider = Arc::new(
        SolanaChainProvider::new(keypair, chain_config.rpc_url.clone(), chain)
            .with_confirmation(chain_config.confirm_attempts, chain_config.confirm_interval_ms),
    );

    registry.register(
        2,
        ExactScheme::NAME,
        &[chain_id.clone()],
        Arc::new(V2SolanaExactFacilitator::new(Arc::clone(&provider))),
    );
    registry.register(
        1,
        ExactScheme::NAME,
        &[chain_id.clone()],
        Arc::new(V1SolanaExactFacilitator::new(provider)),
    );
    #[cfg(feature = "telemetry")]
    tracing::info!(network = %chain_id, "Registered Solana exact scheme");
    Ok(())
}

/// A secret is resolved when present, non-empty, and its env reference
/// expanded (an unexpanded `$VAR` survives as a literal `$` prefix).
fn resolved_secret(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value.starts_with('$') {
        return None;
    }
    Some(value.to_owned())
}

/// Waits for ctrl-c or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl-c");
    }
}
