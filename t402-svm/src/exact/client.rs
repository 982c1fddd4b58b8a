//! Client-side payment construction for the Solana exact scheme.
//!
//! [`ExactSvmClient`] builds a single-instruction `TransferChecked`
//! transaction, reserves the fee-payer slot for the facilitator named in
//! the requirements, signs as the transfer authority, and emits the
//! base64-encoded partially-signed transaction.

use solana_account::Account;
use solana_keypair::Keypair;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;
use std::future::Future;

use t402::facilitator::BoxFuture;
use t402::networks::NetworkRegistry;
use t402::proto::{Extensions, v1 as proto_v1, v2 as proto_v2};
use t402::scheme::{ExactScheme, SchemeClient, SchemeClientError};

use crate::chain::types::Address;
use crate::exact::types::{
    self, ExactSvmPayload, associated_token_account, encode_transaction,
};
use crate::networks::SOLANA_NETWORKS;

/// Signing surface the exact Solana client needs.
pub trait ExactSvmSigner: Send + Sync {
    /// The authority's public key.
    fn pubkey(&self) -> Pubkey;

    /// Signs the given message bytes.
    ///
    /// # Errors
    ///
    /// Returns a description of the signing failure.
    fn sign_message(&self, message: &[u8]) -> Result<Signature, String>;
}

impl ExactSvmSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        Signer::pubkey(self)
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature, String> {
        self.try_sign_message(message).map_err(|e| e.to_string())
    }
}

/// Minimal RPC surface the client needs: a recent blockhash and mint
/// account lookups. Tests substitute in-memory implementations.
pub trait SvmRpc: Send + Sync {
    /// Fetches a recent blockhash.
    fn latest_blockhash(&self) -> impl Future<Output = Result<Hash, String>> + Send;

    /// Fetches one account.
    fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> impl Future<Output = Result<Option<Account>, String>> + Send;
}

impl SvmRpc for solana_client::nonblocking::rpc_client::RpcClient {
    async fn latest_blockhash(&self) -> Result<Hash, String> {
        self.get_latest_blockhash()
            .await
            .map_err(|e| e.to_string())
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, String> {
        match self.get_account(pubkey).await {
            Ok(account) => Ok(Some(account)),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Mint information required to build a `TransferChecked`.
#[derive(Debug, Clone, Copy)]
pub struct MintInfo {
    /// Number of decimal places.
    pub decimals: u8,
    /// Owning token program (Token or Token-2022).
    pub token_program: Pubkey,
}

/// Fetches and unpacks mint information.
///
/// # Errors
///
/// Returns [`SchemeClientError`] when the account is missing or owned by
/// an unknown program.
pub async fn fetch_mint<R: SvmRpc>(rpc: &R, mint: &Pubkey) -> Result<MintInfo, SchemeClientError> {
    let account = rpc
        .get_account(mint)
        .await
        .map_err(SchemeClientError::Signing)?
        .ok_or_else(|| {
            SchemeClientError::UnsupportedRequirements(format!("mint {mint} does not exist"))
        })?;
    let (decimals, token_program) = if account.owner == spl_token::ID {
        let state = spl_token::state::Mint::unpack(&account.data).map_err(|e| {
            SchemeClientError::UnsupportedRequirements(format!("undecodable mint {mint}: {e}"))
        })?;
        (state.decimals, spl_token::ID)
    } else if account.owner == spl_token_2022::ID {
        let state = spl_token_2022::state::Mint::unpack(&account.data).map_err(|e| {
            SchemeClientError::UnsupportedRequirements(format!("undecodable mint {mint}: {e}"))
        })?;
        (state.decimals, spl_token_2022::ID)
    } else {
        return Err(SchemeClientError::UnsupportedRequirements(format!(
            "mint {mint} has unknown owner {}",
            account.owner
        )));
    };
    Ok(MintInfo {
        decimals,
        token_program,
    })
}

/// Client handler for exact payments on Solana (both protocol versions).
pub struct ExactSvmClient<S, R> {
    signer: S,
    rpc: R,
    networks: NetworkRegistry,
}

impl<S, R> std::fmt::Debug for ExactSvmClient<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactSvmClient").finish_non_exhaustive()
    }
}

impl<S, R> ExactSvmClient<S, R> {
    /// Creates a client handler around the given signer and RPC surface.
    #[must_use]
    pub fn new(signer: S, rpc: R) -> Self {
        Self {
            signer,
            rpc,
            networks: NetworkRegistry::from_networks(SOLANA_NETWORKS),
        }
    }
}

impl<S, R> ExactSvmClient<S, R>
where
    S: ExactSvmSigner,
    R: SvmRpc,
{
    /// Builds the partially-signed transfer transaction.
    async fn build_transaction(
        &self,
        fee_payer: &Address,
        pay_to: &Address,
        mint: &Address,
        amount: u64,
    ) -> Result<ExactSvmPayload, SchemeClientError> {
        let authority = self.signer.pubkey();
        let mint_info = fetch_mint(&self.rpc, mint.pubkey()).await?;
        let source = associated_token_account(&authority, &mint_info.token_program, mint.pubkey());
        let destination =
            associated_token_account(pay_to.pubkey(), &mint_info.token_program, mint.pubkey());

        let build = if mint_info.token_program == spl_token_2022::ID {
            spl_token_2022::instruction::transfer_checked(
                &mint_info.token_program,
                &source,
                mint.pubkey(),
                &destination,
                &authority,
                &[],
                amount,
                mint_info.decimals,
            )
        } else {
            spl_token::instruction::transfer_checked(
                &mint_info.token_program,
                &source,
                mint.pubkey(),
                &destination,
                &authority,
                &[],
                amount,
                mint_info.decimals,
            )
        };
        let instruction = build.map_err(|e| SchemeClientError::Signing(e.to_string()))?;

        let blockhash = self
            .rpc
            .latest_blockhash()
            .await
            .map_err(SchemeClientError::Signing)?;
        let message =
            MessageV0::try_compile(fee_payer.pubkey(), &[instruction], &[], blockhash)
                .map_err(|e| SchemeClientError::Signing(e.to_string()))?;
        let message = VersionedMessage::V0(message);
        let num_required = message.header().num_required_signatures as usize;
        let mut transaction = VersionedTransaction {
            signatures: vec![Signature::default(); num_required],
            message,
        };

        // Sign the authority slot; the fee-payer slot stays open for the
        // facilitator.
        let message_bytes = transaction.message.serialize();
        let signature = self
            .signer
            .sign_message(&message_bytes)
            .map_err(SchemeClientError::Signing)?;
        let position = transaction.message.static_account_keys()[..num_required]
            .iter()
            .position(|key| *key == authority)
            .ok_or_else(|| {
                SchemeClientError::Signing("authority is not a required signer".to_owned())
            })?;
        transaction.signatures[position] = signature;

        let transaction = encode_transaction(&transaction)
            .map_err(|e| SchemeClientError::Signing(e.to_string()))?;
        Ok(ExactSvmPayload { transaction })
    }

    async fn create_v2(
        &self,
        requirements: &serde_json::Value,
        resource: Option<&proto_v2::ResourceInfo>,
        extensions: Option<&Extensions>,
    ) -> Result<Vec<u8>, SchemeClientError> {
        let requirements: types::v2::PaymentRequirements =
            serde_json::from_value(requirements.clone()).map_err(|e| {
                SchemeClientError::UnsupportedRequirements(e.to_string())
            })?;
        let fee_payer = requirements
            .extra
            .as_ref()
            .map(|extra| extra.fee_payer)
            .ok_or_else(|| {
                SchemeClientError::UnsupportedRequirements(
                    "requirements are missing the facilitator fee payer".to_owned(),
                )
            })?;
        let payload = self
            .build_transaction(
                &fee_payer,
                &requirements.pay_to,
                &requirements.asset,
                requirements.amount.inner(),
            )
            .await?;
        let payment_payload = types::v2::PaymentPayload {
            accepted: requirements,
            payload,
            resource: resource.cloned(),
            t402_version: proto_v2::V2,
            extensions: extensions.cloned(),
        };
        Ok(serde_json::to_vec(&payment_payload)?)
    }

    async fn create_v1(
        &self,
        requirements: &serde_json::Value,
    ) -> Result<Vec<u8>, SchemeClientError> {
        let requirements: types::v1::PaymentRequirements =
            serde_json::from_value(requirements.clone()).map_err(|e| {
                SchemeClientError::UnsupportedRequirements(e.to_string())
            })?;
        if self
            .networks
            .chain_id_by_name(&requirements.network)
            .is_none()
        {
            return Err(SchemeClientError::UnsupportedRequirements(format!(
                "unknown network {}",
                requirements.network
            )));
        }
        let fee_payer = requirements
            .extra
            .as_ref()
            .map(|extra| extra.fee_payer)
            .ok_or_else(|| {
                SchemeClientError::UnsupportedRequirements(
                    "requirements are missing the facilitator fee payer".to_owned(),
                )
            })?;
        let payload = self
            .build_transaction(
                &fee_payer,
                &requirements.pay_to,
                &requirements.asset,
                requirements.max_amount_required.inner(),
            )
            .await?;
        let payment_payload = types::v1::PaymentPayload {
            t402_version: proto_v1::V1,
            scheme: ExactScheme::NAME.to_owned(),
            network: requirements.network,
            payload,
        };
        Ok(serde_json::to_vec(&payment_payload)?)
    }
}

impl<S, R> SchemeClient for ExactSvmClient<S, R>
where
    S: ExactSvmSigner + 'static,
    R: SvmRpc + 'static,
{
    fn supports(&self, t402_version: u8, scheme: &str, network: &str) -> bool {
        if scheme != ExactScheme::NAME {
            return false;
        }
        match t402_version {
            2 => network.starts_with("solana:"),
            1 => self.networks.chain_id_by_name(network).is_some(),
            _ => false,
        }
    }

    fn create_payment_payload<'a>(
        &'a self,
        t402_version: u8,
        requirements: &'a serde_json::Value,
        resource: Option<&'a proto_v2::ResourceInfo>,
        extensions: Option<&'a Extensions>,
    ) -> BoxFuture<'a, Result<Vec<u8>, SchemeClientError>> {
        Box::pin(async move {
            match t402_version {
                2 => self.create_v2(requirements, resource, extensions).await,
                1 => self.create_v1(requirements).await,
                other => Err(SchemeClientError::UnsupportedRequirements(format!(
                    "unsupported protocol version {other}"
                ))),
            }
        })
    }
}
