//! Facilitator-side verification and settlement for the Solana exact
//! scheme.

pub mod verify;

pub use verify::{TransferRequirement, VerifiedTransfer, verify_transfer};

use std::collections::HashMap;
use std::time::Duration;

use solana_signature::Signature;

#[cfg(feature = "telemetry")]
use tracing_core::Level;

use t402::chain::{ChainId, ChainProvider};
use t402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use t402::networks::NetworkRegistry;
use t402::proto;
use t402::proto::{SettlementError, VerificationError};
use t402::scheme::{ExactScheme, SchemeBuilder, SchemeId};

use crate::chain::provider::{SolanaChainProviderLike, TxStatus};
use crate::exact::types::{self, PaymentRequirementsExtra, is_fully_signed};
use crate::exact::{V1SolanaExact, V2SolanaExact};
use crate::networks::{SOLANA_NETWORKS, default_usdc_mint};

impl<P> SchemeBuilder<P> for V1SolanaExact
where
    P: SolanaChainProviderLike + ChainProvider + Send + Sync + 'static,
{
    fn build(
        &self,
        provider: P,
        _config: Option<serde_json::Value>,
    ) -> Result<Box<dyn Facilitator>, Box<dyn std::error::Error>> {
        Ok(Box::new(V1SolanaExactFacilitator::new(provider)))
    }
}

impl<P> SchemeBuilder<P> for V2SolanaExact
where
    P: SolanaChainProviderLike + ChainProvider + Send + Sync + 'static,
{
    fn build(
        &self,
        provider: P,
        _config: Option<serde_json::Value>,
    ) -> Result<Box<dyn Facilitator>, Box<dyn std::error::Error>> {
        Ok(Box::new(V2SolanaExactFacilitator::new(provider)))
    }
}

/// Completes the signature set and drives the submitted transaction to a
/// terminal state.
///
/// The confirmation state machine polls `getSignatureStatuses` once per
/// interval, falling back to `getTransaction` when the status call hits a
/// transient RPC error. `confirmed`/`finalized` → success; an on-chain
/// error → `settlement_failed`; budget exhausted → `settlement_timeout`.
///
/// # Errors
///
/// Returns [`FacilitatorError`] for simulation failures, transport faults,
/// and timeouts.
pub async fn settle_transfer<P: SolanaChainProviderLike>(
    provider: &P,
    verified: VerifiedTransfer,
) -> Result<Signature, FacilitatorError> {
    let transaction = provider
        .sign(verified.transaction)
        .map_err(|e| FacilitatorError::Onchain(e.to_string()))?;
    if !is_fully_signed(&transaction) {
        #[cfg(feature = "telemetry")]
        tracing::event!(Level::WARN, status = "failed", "undersigned transaction");
        return Err(VerificationError::InvalidSignature(
            "transaction is not fully signed".to_owned(),
        )
        .into());
    }

    match provider.simulate_transaction(&transaction, true).await {
        Ok(Ok(())) => {}
        Ok(Err(simulation_error)) => {
            return Err(SettlementError::SimulationFailed(simulation_error).into());
        }
        Err(transport) => return Err(FacilitatorError::Onchain(transport.to_string())),
    }

    let signature = provider
        .send_transaction(&transaction)
        .await
        .map_err(|e| FacilitatorError::Onchain(e.to_string()))?;

    let interval = Duration::from_millis(provider.confirm_interval_ms());
    for _attempt in 0..provider.confirm_attempts() {
        let status = match provider.signature_status(&signature).await {
            Ok(status) => status,
            Err(_transient) => match provider.transaction_status(&signature).await {
                Ok(status) => status,
                Err(e) => return Err(FacilitatorError::Onchain(e.to_string())),
            },
        };
        match status {
            TxStatus::Confirmed => return Ok(signature),
            TxStatus::Failed(error) => {
                return Err(SettlementError::Failed(error).into());
            }
            TxStatus::Pending => {}
        }
        tokio::time::sleep(interval).await;
    }
    Err(SettlementError::Timeout.into())
}

/// Facilitator for V2 Solana exact payments.
pub struct V2SolanaExactFacilitator<P> {
    provider: P,
}

impl<P> std::fmt::Debug for V2SolanaExactFacilitator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V2SolanaExactFacilitator")
            .finish_non_exhaustive()
    }
}

impl<P> V2SolanaExactFacilitator<P> {
    /// Creates a V2 facilitator over the given provider.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P> V2SolanaExactFacilitator<P>
where
    P: SolanaChainProviderLike + ChainProvider + Send + Sync,
{
    async fn check(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<(VerifiedTransfer, ChainId), FacilitatorError> {
        let typed = types::v2::VerifyRequest::from_request(request)?;
        let payload = &typed.payment_payload;
        let requirements = &typed.payment_requirements;
        if requirements.scheme != ExactScheme::NAME {
            return Err(VerificationError::UnsupportedScheme.into());
        }
        if !payload.accepted.matches(requirements) {
            return Err(VerificationError::NoMatchingRequirement.into());
        }
        let chain_id = self.provider.chain_id();
        if requirements.network != chain_id {
            return Err(VerificationError::NetworkMismatch.into());
        }
        let verified = verify_transfer(
            &self.provider,
            &payload.payload.transaction,
            &TransferRequirement {
                asset: &requirements.asset,
                pay_to: &requirements.pay_to,
                amount: requirements.amount.inner(),
            },
        )
        .await?;
        Ok((verified, chain_id))
    }
}

impl<P> Facilitator for V2SolanaExactFacilitator<P>
where
    P: SolanaChainProviderLike + ChainProvider + Send + Sync,
{
    fn verify(
        &self,
        request: proto::VerifyRequest,
    ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            let (verified, _) = self.check(&request).await?;
            Ok(proto::VerifyResponse::valid(verified.payer.to_string()))
        })
    }

    fn settle(
        &self,
        request: proto::SettleRequest,
    ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            let (verified, chain_id) = self.check(&request).await?;
            let payer = verified.payer.to_string();
            let signature = settle_transfer(&self.provider, verified).await?;
            Ok(proto::SettleResponse::Success {
                payer,
                transaction: signature.to_string(),
                network: chain_id.to_string(),
            })
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
        Box::pin(async move {
            let chain_id = self.provider.chain_id();
            Ok(proto::SupportedResponse {
                kinds: vec![supported_kind(
                    2,
                    chain_id.to_string(),
                    &chain_id,
                    self.provider.fee_payer(),
                )],
                extensions: Vec::new(),
                signers: HashMap::from([(
                    V2SolanaExact.caip_family(),
                    vec![self.provider.fee_payer().to_string()],
                )]),
            })
        })
    }
}

/// Facilitator for V1 Solana exact payments (legacy network names).
pub struct V1SolanaExactFacilitator<P> {
    provider: P,
    networks: NetworkRegistry,
}

impl<P> std::fmt::Debug for V1SolanaExactFacilitator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V1SolanaExactFacilitator")
            .finish_non_exhaustive()
    }
}

impl<P> V1SolanaExactFacilitator<P> {
    /// Creates a V1 facilitator over the given provider.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            networks: NetworkRegistry::from_networks(SOLANA_NETWORKS),
        }
    }
}

impl<P> V1SolanaExactFacilitator<P>
where
    P: SolanaChainProviderLike + ChainProvider + Send + Sync,
{
    async fn check(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<(VerifiedTransfer, String), FacilitatorError> {
        let typed = types::v1::VerifyRequest::from_request(request)?;
        let payload = &typed.payment_payload;
        let requirements = &typed.payment_requirements;
        if payload.scheme != ExactScheme::NAME || requirements.scheme != ExactScheme::NAME {
            return Err(VerificationError::UnsupportedScheme.into());
        }
        if payload.network != requirements.network {
            return Err(VerificationError::NetworkMismatch.into());
        }
        let chain_id = self.provider.chain_id();
        let requirements_chain = self
            .networks
            .chain_id_by_name(&requirements.network)
            .ok_or(VerificationError::UnsupportedNetwork)?;
        if requirements_chain != &chain_id {
            return Err(VerificationError::NetworkMismatch.into());
        }
        let verified = verify_transfer(
            &self.provider,
            &payload.payload.transaction,
            &TransferRequirement {
                asset: &requirements.asset,
                pay_to: &requirements.pay_to,
                amount: requirements.max_amount_required.inner(),
            },
        )
        .await?;
        Ok((verified, requirements.network.clone()))
    }
}

impl<P> Facilitator for V1SolanaExactFacilitator<P>
where
    P: SolanaChainProviderLike + ChainProvider + Send + Sync,
{
    fn verify(
        &self,
        request: proto::VerifyRequest,
    ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            let (verified, _) = self.check(&request).await?;
            Ok(proto::VerifyResponse::valid(verified.payer.to_string()))
        })
    }

    fn settle(
        &self,
        request: proto::SettleRequest,
    ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            let (verified, network_name) = self.check(&request).await?;
            let payer = verified.payer.to_string();
            let signature = settle_transfer(&self.provider, verified).await?;
            Ok(proto::SettleResponse::Success {
                payer,
                transaction: signature.to_string(),
                network: network_name,
            })
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
        Box::pin(async move {
            let chain_id = self.provider.chain_id();
            let kinds = self
                .networks
                .name_by_chain_id(&chain_id)
                .map(|name| {
                    vec![supported_kind(
                        1,
                        name.to_owned(),
                        &chain_id,
                        self.provider.fee_payer(),
                    )]
                })
                .unwrap_or_default();
            Ok(proto::SupportedResponse {
                kinds,
                extensions: Vec::new(),
                signers: HashMap::from([(
                    V1SolanaExact.caip_family(),
                    vec![self.provider.fee_payer().to_string()],
                )]),
            })
        })
    }
}

fn supported_kind(
    t402_version: u8,
    network: String,
    chain_id: &ChainId,
    fee_payer: crate::chain::Address,
) -> proto::SupportedPaymentKind {
    proto::SupportedPaymentKind {
        t402_version,
        scheme: ExactScheme::NAME.to_owned(),
        network,
        asset: default_usdc_mint(&chain_id.to_string()).map(ToOwned::to_owned),
        extra: serde_json::to_value(PaymentRequirementsExtra { fee_payer }).ok(),
        extensions: None,
    }
}

#[cfg(all(test, feature = "client"))]
mod tests {
    use super::*;
    use crate::chain::provider::SolanaChainProviderError;
    use crate::chain::types::SolanaChainReference;
    use crate::exact::client::{ExactSvmClient, SvmRpc};
    use crate::exact::types::PaymentRequirementsExtra;
    use crate::networks::SOLANA_DEVNET_REFERENCE;
    use solana_account::Account;
    use solana_keypair::Keypair;
    use solana_message::Hash;
    use solana_pubkey::Pubkey;
    use solana_signer::Signer as _;
    use solana_transaction::versioned::VersionedTransaction;
    use spl_token::solana_program::program_option::COption;
    use spl_token::solana_program::program_pack::Pack;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn packed_mint(decimals: u8) -> Account {
        let state = spl_token::state::Mint {
            mint_authority: COption::None,
            supply: 1_000_000_000,
            decimals,
            is_initialized: true,
            freeze_authority: COption::None,
        };
        let mut data = vec![0u8; spl_token::state::Mint::LEN];
        spl_token::state::Mint::pack(state, &mut data).unwrap();
        Account {
            lamports: 1,
            data,
            owner: spl_token::ID,
            executable: false,
            rent_epoch: 0,
        }
    }

    fn packed_token_account(mint: Pubkey, owner: Pubkey, amount: u64) -> Account {
        let state = spl_token::state::Account {
            mint,
            owner,
            amount,
            delegate: COption::None,
            state: spl_token::state::AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };
        let mut data = vec![0u8; spl_token::state::Account::LEN];
        spl_token::state::Account::pack(state, &mut data).unwrap();
        Account {
            lamports: 1,
            data,
            owner: spl_token::ID,
            executable: false,
            rent_epoch: 0,
        }
    }

    #[derive(Clone)]
    struct MockChain {
        fee_payer: Arc<Keypair>,
        accounts: Arc<HashMap<Pubkey, Account>>,
        statuses: Arc<std::sync::Mutex<Vec<TxStatus>>>,
    }

    impl SvmRpc for MockChain {
        async fn latest_blockhash(&self) -> Result<Hash, String> {
            Ok(Hash::default())
        }

        async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, String> {
            Ok(self.accounts.get(pubkey).cloned())
        }
    }

    impl SolanaChainProviderLike for MockChain {
        fn pubkey(&self) -> Pubkey {
            self.fee_payer.pubkey()
        }

        fn confirm_attempts(&self) -> usize {
            3
        }

        fn confirm_interval_ms(&self) -> u64 {
            1
        }

        fn sign(
            &self,
            mut tx: VersionedTransaction,
        ) -> Result<VersionedTransaction, SolanaChainProviderError> {
            let message_bytes = tx.message.serialize();
            let signature = self
                .fee_payer
                .try_sign_message(message_bytes.as_slice())
                .map_err(SolanaChainProviderError::Signer)?;
            let num_required = tx.message.header().num_required_signatures as usize;
            let position = tx.message.static_account_keys()[..num_required]
                .iter()
                .position(|key| *key == self.fee_payer.pubkey())
                .ok_or_else(|| {
                    SolanaChainProviderError::InvalidTransaction(
                        "fee payer missing".to_owned(),
                    )
                })?;
            if tx.signatures.len() < num_required {
                tx.signatures
                    .resize(num_required, solana_signature::Signature::default());
            }
            tx.signatures[position] = signature;
            Ok(tx)
        }

        async fn get_multiple_accounts(
            &self,
            pubkeys: &[Pubkey],
        ) -> Result<Vec<Option<Account>>, SolanaChainProviderError> {
            Ok(pubkeys
                .iter()
                .map(|key| self.accounts.get(key).cloned())
                .collect())
        }

        async fn simulate_transaction(
            &self,
            _tx: &VersionedTransaction,
            _sig_verify: bool,
        ) -> Result<Result<(), String>, SolanaChainProviderError> {
            Ok(Ok(()))
        }

        async fn send_transaction(
            &self,
            tx: &VersionedTransaction,
        ) -> Result<Signature, SolanaChainProviderError> {
            Ok(tx.signatures[0])
        }

        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<TxStatus, SolanaChainProviderError> {
            let mut statuses = self.statuses.lock().unwrap();
            Ok(if statuses.is_empty() {
                TxStatus::Confirmed
            } else {
                statuses.remove(0)
            })
        }

        async fn transaction_status(
            &self,
            _signature: &Signature,
        ) -> Result<TxStatus, SolanaChainProviderError> {
            Ok(TxStatus::Confirmed)
        }
    }

    impl ChainProvider for MockChain {
        fn signer_addresses(&self) -> Vec<String> {
            vec![self.fee_payer.pubkey().to_string()]
        }

        fn chain_id(&self) -> ChainId {
            SolanaChainReference::new(SOLANA_DEVNET_REFERENCE).as_chain_id()
        }
    }

    struct Fixture {
        chain: MockChain,
        payer: Keypair,
        requirements: types::v2::PaymentRequirements,
    }

    fn fixture(balance: u64, required: u64) -> Fixture {
        let fee_payer = Keypair::new();
        let payer = Keypair::new();
        let pay_to = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let source =
            crate::exact::types::associated_token_account(&payer.pubkey(), &spl_token::ID, &mint);
        let destination =
            crate::exact::types::associated_token_account(&pay_to, &spl_token::ID, &mint);
        let accounts = HashMap::from([
            (mint, packed_mint(6)),
            (source, packed_token_account(mint, payer.pubkey(), balance)),
            (destination, packed_token_account(mint, pay_to, 0)),
        ]);

        let chain = MockChain {
            fee_payer: Arc::new(fee_payer),
            accounts: Arc::new(accounts),
            statuses: Arc::new(std::sync::Mutex::new(Vec::new())),
        };
        let requirements = types::v2::PaymentRequirements {
            scheme: "exact".to_owned(),
            network: format!("solana:{SOLANA_DEVNET_REFERENCE}").parse().unwrap(),
            amount: required.into(),
            pay_to: pay_to.into(),
            max_timeout_seconds: 60,
            asset: mint.into(),
            extra: Some(PaymentRequirementsExtra {
                fee_payer: chain.fee_payer.pubkey().into(),
            }),
        };
        Fixture {
            chain,
            payer,
            requirements,
        }
    }

    async fn signed_request(fixture: &Fixture) -> proto::VerifyRequest {
        let client = ExactSvmClient::new(
            fixture.payer.insecure_clone(),
            fixture.chain.clone(),
        );
        let requirements_json = serde_json::to_value(&fixture.requirements).unwrap();
        let payload_bytes = {
            use t402::scheme::SchemeClient;
            client
                .create_payment_payload(2, &requirements_json, None, None)
                .await
                .unwrap()
        };
        let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).unwrap();
        proto::VerifyRequest::assemble(2, &payload, &fixture.requirements).unwrap()
    }

    #[tokio::test]
    async fn client_payload_verifies_and_settles() {
        let fixture = fixture(5_000, 1_000);
        let request = signed_request(&fixture).await;
        let facilitator = V2SolanaExactFacilitator::new(fixture.chain.clone());

        let verified = facilitator.verify(request.clone()).await.unwrap();
        assert_eq!(
            verified,
            proto::VerifyResponse::valid(fixture.payer.pubkey().to_string())
        );

        let settled = facilitator.settle(request).await.unwrap();
        match settled {
            proto::SettleResponse::Success { payer, network, .. } => {
                assert_eq!(payer, fixture.payer.pubkey().to_string());
                assert_eq!(network, format!("solana:{SOLANA_DEVNET_REFERENCE}"));
            }
            proto::SettleResponse::Error { .. } => panic!("settlement failed"),
        }
    }

    #[tokio::test]
    async fn insufficient_balance_is_rejected() {
        let fixture = fixture(500, 1_000);
        let request = signed_request(&fixture).await;
        let facilitator = V2SolanaExactFacilitator::new(fixture.chain.clone());
        let error = facilitator.verify(request).await.unwrap_err();
        assert!(matches!(
            error,
            FacilitatorError::Verification(VerificationError::InsufficientFunds)
        ));
    }

    #[tokio::test]
    async fn confirmation_timeout_maps_to_settlement_timeout() {
        let fixture = fixture(5_000, 1_000);
        {
            let mut statuses = fixture.chain.statuses.lock().unwrap();
            *statuses = vec![TxStatus::Pending; 10];
        }
        let request = signed_request(&fixture).await;
        let facilitator = V2SolanaExactFacilitator::new(fixture.chain.clone());
        let error = facilitator.settle(request).await.unwrap_err();
        assert!(matches!(
            error,
            FacilitatorError::Settlement(SettlementError::Timeout)
        ));
    }
}
