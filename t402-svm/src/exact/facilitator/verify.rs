//! Transaction verification for the Solana exact scheme.
//!
//! A valid payment transaction contains exactly one instruction: an SPL
//! Token (or Token-2022) `TransferChecked` whose mint, destination, amount,
//! and decimals match the requirements, whose fee payer is the one the
//! facilitator declared, and whose non-fee-payer signatures are present and
//! verify over the message bytes.

use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use t402::proto::VerificationError;

use crate::chain::provider::SolanaChainProviderLike;
use crate::chain::types::Address;
use crate::exact::types::{associated_token_account, decode_transaction};

/// Requirement fields the transfer is checked against.
#[derive(Debug)]
pub struct TransferRequirement<'a> {
    /// Expected mint.
    pub asset: &'a Address,
    /// Expected recipient (the owner, not the token account).
    pub pay_to: &'a Address,
    /// Required amount in base units.
    pub amount: u64,
}

/// The outcome of a successful verification: the payer and the decoded
/// transaction, ready for fee-payer co-signing.
#[derive(Debug)]
pub struct VerifiedTransfer {
    /// The transfer authority (source owner).
    pub payer: Address,
    /// The decoded transaction.
    pub transaction: VersionedTransaction,
}

/// Parsed fields of the single `TransferChecked` instruction.
#[derive(Debug, Clone, Copy)]
struct TransferChecked {
    amount: u64,
    decimals: u8,
    source: Pubkey,
    mint: Pubkey,
    destination: Pubkey,
    authority: Pubkey,
    token_program: Pubkey,
}

fn parse_transfer_instruction(
    transaction: &VersionedTransaction,
) -> Result<TransferChecked, VerificationError> {
    let instructions = transaction.message.instructions();
    if instructions.len() != 1 {
        return Err(VerificationError::InvalidInstruction(format!(
            "expected exactly one instruction, found {}",
            instructions.len()
        )));
    }
    let instruction = &instructions[0];
    let account_keys = transaction.message.static_account_keys();
    let program_id = *instruction.program_id(account_keys);
    // Token and Token-2022 share the instruction layout; only the program
    // id differs.
    let token_program = if program_id == spl_token::ID {
        spl_token::ID
    } else if program_id == spl_token_2022::ID {
        spl_token_2022::ID
    } else {
        return Err(VerificationError::InvalidInstruction(format!(
            "not a token program instruction: {program_id}"
        )));
    };
    let token_instruction =
        spl_token::instruction::TokenInstruction::unpack(instruction.data.as_slice()).map_err(
            |e| VerificationError::InvalidInstruction(format!("undecodable instruction: {e}")),
        )?;
    let spl_token::instruction::TokenInstruction::TransferChecked { amount, decimals } =
        token_instruction
    else {
        return Err(VerificationError::InvalidInstruction(
            "instruction is not TransferChecked".to_owned(),
        ));
    };

    let account_at = |index: usize| -> Result<Pubkey, VerificationError> {
        let key_index = instruction.accounts.get(index).copied().ok_or_else(|| {
            VerificationError::InvalidInstruction(format!("missing account {index}"))
        })?;
        account_keys
            .get(key_index as usize)
            .copied()
            .ok_or_else(|| {
                VerificationError::InvalidInstruction(format!("missing account {index}"))
            })
    };

    Ok(TransferChecked {
        amount,
        decimals,
        source: account_at(0)?,
        mint: account_at(1)?,
        destination: account_at(2)?,
        authority: account_at(3)?,
        token_program,
    })
}

/// Verifies every non-fee-payer signature over the message bytes.
fn assert_signatures(
    transaction: &VersionedTransaction,
    fee_payer: &Pubkey,
) -> Result<(), VerificationError> {
    let message_bytes = transaction.message.serialize();
    let num_required = transaction.message.header().num_required_signatures as usize;
    let static_keys = transaction.message.static_account_keys();
    let default = Signature::default();
    for index in 0..num_required {
        let Some(key) = static_keys.get(index) else {
            return Err(VerificationError::InvalidPayload(
                "signer count exceeds account keys".to_owned(),
            ));
        };
        if key == fee_payer {
            continue;
        }
        let signature = transaction.signatures.get(index).ok_or_else(|| {
            VerificationError::InvalidSignature(format!("missing signature for {key}"))
        })?;
        if *signature == default {
            return Err(VerificationError::InvalidSignature(format!(
                "missing signature for {key}"
            )));
        }
        if !signature.verify(key.as_ref(), &message_bytes) {
            return Err(VerificationError::InvalidSignature(format!(
                "signature for {key} does not verify"
            )));
        }
    }
    Ok(())
}

/// Runs the full verification ladder over a base64-encoded transaction.
///
/// # Errors
///
/// Returns a [`VerificationError`] carrying the registered reason for the
/// first failed check.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err))]
pub async fn verify_transfer<P: SolanaChainProviderLike>(
    provider: &P,
    transaction_b64: &str,
    requirement: &TransferRequirement<'_>,
) -> Result<VerifiedTransfer, VerificationError> {
    let transaction = decode_transaction(transaction_b64)?;
    let transfer = parse_transfer_instruction(&transaction)?;

    if transfer.mint != *requirement.asset.pubkey() {
        return Err(VerificationError::AssetMismatch);
    }
    let expected_destination = associated_token_account(
        requirement.pay_to.pubkey(),
        &transfer.token_program,
        &transfer.mint,
    );
    if transfer.destination != expected_destination {
        return Err(VerificationError::RecipientMismatch);
    }
    if transfer.amount < requirement.amount {
        return Err(VerificationError::InsufficientAmount);
    }

    let fee_payer = provider.pubkey();
    let declared_fee_payer = transaction
        .message
        .static_account_keys()
        .first()
        .copied()
        .ok_or_else(|| VerificationError::InvalidPayload("empty account keys".to_owned()))?;
    if declared_fee_payer != fee_payer {
        return Err(VerificationError::InvalidPayload(format!(
            "fee payer {declared_fee_payer} is not managed by this facilitator"
        )));
    }
    if transfer.authority == fee_payer {
        return Err(VerificationError::InvalidInstruction(
            "fee payer must not be the transfer authority".to_owned(),
        ));
    }

    assert_signatures(&transaction, &fee_payer)?;

    // One round trip for source balance, mint decimals, and destination
    // existence.
    let accounts = provider
        .get_multiple_accounts(&[transfer.source, transfer.mint, transfer.destination])
        .await
        .map_err(|e| VerificationError::InvalidPayload(e.to_string()))?;
    let source_account = accounts
        .first()
        .cloned()
        .flatten()
        .ok_or(VerificationError::InsufficientFunds)?;
    let mint_account = accounts
        .get(1)
        .cloned()
        .flatten()
        .ok_or(VerificationError::AssetMismatch)?;
    if accounts.get(2).cloned().flatten().is_none() {
        // The destination ATA must exist before payment.
        return Err(VerificationError::RecipientMismatch);
    }

    let mint_state = spl_token::state::Mint::unpack(&mint_account.data)
        .map_err(|_| VerificationError::AssetMismatch)?;
    if mint_state.decimals != transfer.decimals {
        return Err(VerificationError::AssetMismatch);
    }

    let source_state = spl_token::state::Account::unpack(&source_account.data)
        .map_err(|e| VerificationError::InvalidPayload(format!("undecodable source account: {e}")))?;
    if source_state.amount < transfer.amount {
        return Err(VerificationError::InsufficientFunds);
    }

    Ok(VerifiedTransfer {
        payer: Address::new(transfer.authority),
        transaction,
    })
}
