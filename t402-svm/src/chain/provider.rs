//! Solana chain provider for the facilitator.
//!
//! [`SolanaChainProvider`] wraps a nonblocking RPC client and the
//! facilitator's fee-payer keypair. [`SolanaChainProviderLike`] is the
//! narrow interface mechanism code depends on, so tests substitute
//! in-memory implementations that never touch a network.

use solana_account::Account;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::{Signer, SignerError};
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_status_client_types::UiTransactionEncoding;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use t402::chain::{ChainId, ChainProvider};

use crate::chain::types::{Address, SolanaChainReference};

/// Errors from Solana chain provider operations.
#[derive(Debug, thiserror::Error)]
pub enum SolanaChainProviderError {
    /// Failed to sign a transaction.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// The transaction is invalid (e.g., missing the fee-payer slot).
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    /// RPC transport error.
    #[error(transparent)]
    Transport(Box<ClientErrorKind>),
}

impl From<ClientError> for SolanaChainProviderError {
    fn from(value: ClientError) -> Self {
        Self::Transport(value.kind)
    }
}

/// Coarse confirmation status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet visible at the requested commitment.
    Pending,
    /// Confirmed or finalized.
    Confirmed,
    /// Landed on-chain but failed.
    Failed(String),
}

/// Default number of confirmation polling attempts.
pub const DEFAULT_CONFIRM_ATTEMPTS: usize = 60;

/// Default confirmation polling interval in milliseconds.
pub const DEFAULT_CONFIRM_INTERVAL_MS: u64 = 1_000;

/// Provider for interacting with a Solana blockchain.
pub struct SolanaChainProvider {
    chain: SolanaChainReference,
    keypair: Arc<Keypair>,
    rpc_client: Arc<RpcClient>,
    confirm_attempts: usize,
    confirm_interval_ms: u64,
}

impl Debug for SolanaChainProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaChainProvider")
            .field("pubkey", &self.keypair.pubkey())
            .field("chain", &self.chain)
            .field("rpc_url", &self.rpc_client.url())
            .finish()
    }
}

impl SolanaChainProvider {
    /// Creates a provider over the given keypair and RPC endpoint.
    #[must_use]
    pub fn new(keypair: Keypair, rpc_url: String, chain: SolanaChainReference) -> Self {
        #[cfg(feature = "telemetry")]
        tracing::info!(
            chain = %chain,
            rpc = rpc_url,
            fee_payer = %keypair.pubkey(),
            "Using Solana provider"
        );
        Self {
            keypair: Arc::new(keypair),
            rpc_client: Arc::new(RpcClient::new(rpc_url)),
            chain,
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            confirm_interval_ms: DEFAULT_CONFIRM_INTERVAL_MS,
        }
    }

    /// Overrides the confirmation polling budget.
    #[must_use]
    pub const fn with_confirmation(mut self, attempts: usize, interval_ms: u64) -> Self {
        self.confirm_attempts = attempts;
        self.confirm_interval_ms = interval_ms;
        self
    }

    /// Returns a handle to the underlying RPC client.
    #[must_use]
    pub fn rpc_client(&self) -> Arc<RpcClient> {
        Arc::clone(&self.rpc_client)
    }
}

impl ChainProvider for SolanaChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        vec![self.keypair.pubkey().to_string()]
    }

    fn chain_id(&self) -> ChainId {
        (&self.chain).into()
    }
}

/// The narrow provider surface the exact-scheme mechanism depends on.
pub trait SolanaChainProviderLike {
    /// The fee payer's public key.
    fn pubkey(&self) -> Pubkey;

    /// The fee payer as an [`Address`].
    fn fee_payer(&self) -> Address {
        Address::new(self.pubkey())
    }

    /// Confirmation polling attempts.
    fn confirm_attempts(&self) -> usize;

    /// Confirmation polling interval in milliseconds.
    fn confirm_interval_ms(&self) -> u64;

    /// Places the fee payer's signature at its signer index.
    ///
    /// # Errors
    ///
    /// Fails when the fee payer is not among the required signers.
    fn sign(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, SolanaChainProviderError>;

    /// Fetches multiple accounts in one round trip.
    fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<Option<Account>>, SolanaChainProviderError>> + Send;

    /// Simulates the transaction; `sig_verify` enables signature checks.
    ///
    /// Returns the on-chain error string when the simulation fails.
    fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        sig_verify: bool,
    ) -> impl Future<Output = Result<Result<(), String>, SolanaChainProviderError>> + Send;

    /// Submits the transaction with preflight skipped.
    fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, SolanaChainProviderError>> + Send;

    /// One `getSignatureStatuses` poll step.
    fn signature_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<TxStatus, SolanaChainProviderError>> + Send;

    /// One `getTransaction` poll step — the fallback when
    /// [`SolanaChainProviderLike::signature_status`] hits a transient RPC
    /// error.
    fn transaction_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<TxStatus, SolanaChainProviderError>> + Send;
}

impl SolanaChainProviderLike for SolanaChainProvider {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn confirm_attempts(&self) -> usize {
        self.confirm_attempts
    }

    fn confirm_interval_ms(&self) -> u64 {
        self.confirm_interval_ms
    }

    fn sign(
        &self,
        mut tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, SolanaChainProviderError> {
        let message_bytes = tx.message.serialize();
        let signature = self.keypair.try_sign_message(message_bytes.as_slice())?;
        let num_required = tx.message.header().num_required_signatures as usize;
        let static_keys = tx.message.static_account_keys();
        let position = static_keys[..num_required.min(static_keys.len())]
            .iter()
            .position(|key| *key == self.pubkey())
            .ok_or_else(|| {
                SolanaChainProviderError::InvalidTransaction(
                    "fee payer is not among the required signers".to_owned(),
                )
            })?;
        if tx.signatures.len() < num_required {
            tx.signatures.resize(num_required, Signature::default());
        }
        tx.signatures[position] = signature;
        Ok(tx)
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, SolanaChainProviderError> {
        let accounts = self.rpc_client.get_multiple_accounts(pubkeys).await?;
        Ok(accounts)
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        sig_verify: bool,
    ) -> Result<Result<(), String>, SolanaChainProviderError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify,
            replace_recent_blockhash: false,
            commitment: Some(CommitmentConfig::confirmed()),
            ..RpcSimulateTransactionConfig::default()
        };
        let simulation = self
            .rpc_client
            .simulate_transaction_with_config(tx, config)
            .await?;
        Ok(match simulation.value.err {
            None => Ok(()),
            Some(err) => Err(err.to_string()),
        })
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Signature, SolanaChainProviderError> {
        let signature = self
            .rpc_client
            .send_transaction_with_config(
                tx,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await?;
        Ok(signature)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<TxStatus, SolanaChainProviderError> {
        let statuses = self
            .rpc_client
            .get_signature_statuses(&[*signature])
            .await?;
        let Some(Some(status)) = statuses.value.into_iter().next() else {
            return Ok(TxStatus::Pending);
        };
        if let Some(err) = status.err {
            return Ok(TxStatus::Failed(err.to_string()));
        }
        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            Ok(TxStatus::Confirmed)
        } else {
            Ok(TxStatus::Pending)
        }
    }

    async fn transaction_status(
        &self,
        signature: &Signature,
    ) -> Result<TxStatus, SolanaChainProviderError> {
        let transaction = self
            .rpc_client
            .get_transaction(signature, UiTransactionEncoding::Base64)
            .await;
        match transaction {
            Ok(confirmed) => {
                let failed = confirmed
                    .transaction
                    .meta
                    .and_then(|meta| meta.err)
                    .map(|err| err.to_string());
                Ok(match failed {
                    Some(err) => TxStatus::Failed(err),
                    None => TxStatus::Confirmed,
                })
            }
            // Not found yet at this commitment: keep polling.
            Err(e) => match *e.kind {
                ClientErrorKind::RpcError(_) => Ok(TxStatus::Pending),
                kind => Err(SolanaChainProviderError::Transport(Box::new(kind))),
            },
        }
    }
}

impl<T: SolanaChainProviderLike + Sync> SolanaChainProviderLike for Arc<T> {
    fn pubkey(&self) -> Pubkey {
        (**self).pubkey()
    }

    fn confirm_attempts(&self) -> usize {
        (**self).confirm_attempts()
    }

    fn confirm_interval_ms(&self) -> u64 {
        (**self).confirm_interval_ms()
    }

    fn sign(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, SolanaChainProviderError> {
        (**self).sign(tx)
    }

    fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<Option<Account>>, SolanaChainProviderError>> + Send {
        (**self).get_multiple_accounts(pubkeys)
    }

    fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        sig_verify: bool,
    ) -> impl Future<Output = Result<Result<(), String>, SolanaChainProviderError>> + Send {
        (**self).simulate_transaction(tx, sig_verify)
    }

    fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, SolanaChainProviderError>> + Send {
        (**self).send_transaction(tx)
    }

    fn signature_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<TxStatus, SolanaChainProviderError>> + Send {
        (**self).signature_status(signature)
    }

    fn transaction_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<TxStatus, SolanaChainProviderError>> + Send {
        (**self).transaction_status(signature)
    }
}
