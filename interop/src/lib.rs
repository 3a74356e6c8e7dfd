//! Deterministic keys, deposits and genesis states for tests and local networks.

use core::num::NonZeroU64;

use anyhow::Result;
use arithmetic::U64Ext as _;
use bls::{PublicKeyBytes, SecretKey, SignatureBytes};
use helper_functions::{accessors, signing::SignForAllForks as _};
use hex_literal::hex;
use num_bigint::BigUint;
use ssz::{ContiguousList, ContiguousVector, SszHash as _, TryFromIterator as _};
use typenum::{Unsigned as _, U4294967296};
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{DepositContractTreeDepth, DOMAIN_BEACON_ATTESTER, FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        containers::{
            BeaconBlock, BeaconBlockBody, BeaconBlockHeader, Deposit, DepositData, DepositMessage,
            Eth1Data, Fork, SignedBeaconBlock, Validator,
        },
        primitives::{DepositIndex, UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
};

const QUICK_START_ETH1_BLOCK_HASH: H256 = H256([0x42; 32]);

const BLS_WITHDRAWAL_PREFIX: u8 = 0;

// Big-endian encoding of the BLS12-381 scalar field order.
const CURVE_ORDER: &[u8] =
    &hex!("73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001");

// The deposit contract tree holds at most 2³² deposits.
type DepositDataList = ContiguousList<DepositData, U4294967296>;

/// Secret key of the validator at `validator_index` in a mocked start.
///
/// The key is the little-endian interpretation of `hash(validator_index)` reduced modulo the
/// curve order.
#[must_use]
pub fn secret_key(validator_index: ValidatorIndex) -> SecretKey {
    let index_hash = hashing::hash(validator_index.hash_tree_root());
    let curve_order = BigUint::from_bytes_be(CURVE_ORDER);
    let secret_key_uint = BigUint::from_bytes_le(index_hash.as_bytes()) % &curve_order;
    let unpadded = secret_key_uint.to_bytes_be();
    let mut padded = [0; 32];
    padded[32 - unpadded.len()..].copy_from_slice(unpadded.as_slice());
    SecretKey::from_bytes(padded).expect("reduction modulo the curve order yields a valid scalar")
}

#[must_use]
pub fn bls_withdrawal_credentials(public_key: PublicKeyBytes) -> H256 {
    let mut withdrawal_credentials = hashing::hash(public_key);
    withdrawal_credentials.as_bytes_mut()[0] = BLS_WITHDRAWAL_PREFIX;
    withdrawal_credentials
}

/// Deposit of `MAX_EFFECTIVE_BALANCE` signed with a proof of possession.
#[must_use]
pub fn quick_start_deposit_data<P: Preset>(config: &Config, secret_key: &SecretKey) -> DepositData {
    let pubkey = secret_key.to_public_key().into();
    let withdrawal_credentials = bls_withdrawal_credentials(pubkey);
    let amount = P::MAX_EFFECTIVE_BALANCE;

    let deposit_message = DepositMessage {
        pubkey,
        withdrawal_credentials,
        amount,
    };

    let signature = deposit_message.sign(config, secret_key).into();

    DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
    }
}

/// Deposits with Merkle proofs against the root of the whole `deposit_data` list.
///
/// Returns the deposits along with that root. Proofs include the list length as the last node.
pub fn deposits_with_proofs(deposit_data: &[DepositData]) -> Result<(Vec<Deposit>, H256)> {
    let deposit_root = DepositDataList::try_from(deposit_data.to_vec())?.hash_tree_root();
    let chunks = deposit_data
        .iter()
        .map(DepositData::hash_tree_root)
        .collect::<Vec<_>>();

    let length_node = u64::try_from(deposit_data.len())?.hash_tree_root();

    let deposits = deposit_data
        .iter()
        .enumerate()
        .map(|(index, data)| {
            let mut proof = ssz::merkle_proof(&chunks, index, DepositContractTreeDepth::U8);
            proof.push(length_node);

            Ok(Deposit {
                proof: ContiguousVector::try_from_iter(proof)?,
                data: *data,
            })
        })
        .collect::<Result<_>>()?;

    Ok((deposits, deposit_root))
}

/// Genesis state in which validators `0..validator_count` are active with interop keys.
pub fn quick_start_beacon_state<P: Preset>(
    config: &Config,
    genesis_time: UnixSeconds,
    validator_count: NonZeroU64,
) -> Result<BeaconState<P>> {
    let deposit_data = (0..validator_count.get())
        .map(|index| quick_start_deposit_data::<P>(config, &secret_key(index)))
        .collect::<Vec<_>>();

    genesis_state_from_deposit_data(config, genesis_time, &deposit_data)
}

/// Builds a genesis state in which every deposit has already been processed.
pub fn genesis_state_from_deposit_data<P: Preset>(
    config: &Config,
    genesis_time: UnixSeconds,
    deposit_data: &[DepositData],
) -> Result<BeaconState<P>> {
    let (_, deposit_root) = deposits_with_proofs(deposit_data)?;
    let deposit_count: DepositIndex = deposit_data.len().try_into()?;

    let mut state = BeaconState::<P> {
        genesis_time,
        fork: Fork {
            previous_version: config.genesis_fork_version,
            current_version: config.genesis_fork_version,
            epoch: GENESIS_EPOCH,
        },
        latest_block_header: BeaconBlockHeader {
            body_root: BeaconBlockBody::<P>::default().hash_tree_root(),
            ..BeaconBlockHeader::default()
        },
        eth1_data: Eth1Data {
            deposit_root,
            deposit_count,
            block_hash: QUICK_START_ETH1_BLOCK_HASH,
        },
        eth1_deposit_index: deposit_count,
        randao_mixes: ContiguousVector::repeat_element(QUICK_START_ETH1_BLOCK_HASH),
        ..BeaconState::default()
    };

    for data in deposit_data {
        let effective_balance = data
            .amount
            .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
            .min(P::MAX_EFFECTIVE_BALANCE);

        let activation_epoch = if effective_balance == P::MAX_EFFECTIVE_BALANCE {
            GENESIS_EPOCH
        } else {
            FAR_FUTURE_EPOCH
        };

        state.validators.push(Validator {
            pubkey: data.pubkey.into(),
            withdrawal_credentials: data.withdrawal_credentials,
            effective_balance,
            slashed: false,
            activation_eligibility_epoch: activation_epoch,
            activation_epoch,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        })?;

        state.balances.push(data.amount)?;
    }

    state.genesis_validators_root = state.validators.hash_tree_root();

    let active_index_root = accessors::compute_active_index_root(&state, GENESIS_EPOCH)?;
    state.active_index_roots = ContiguousVector::repeat_element(active_index_root);

    let seed = accessors::get_seed(&state, GENESIS_EPOCH, DOMAIN_BEACON_ATTESTER)?;
    state.previous_shuffling_seed = seed;
    state.current_shuffling_seed = seed;

    Ok(state)
}

/// The unsigned block a genesis state commits to.
#[must_use]
pub fn genesis_block<P: Preset>(state: &BeaconState<P>) -> SignedBeaconBlock<P> {
    BeaconBlock {
        state_root: state.hash_tree_root(),
        ..BeaconBlock::default()
    }
    .with_signature(SignatureBytes::empty())
}

#[cfg(test)]
mod tests {
    use helper_functions::predicates;
    use types::preset::Minimal;

    use super::*;

    #[test]
    fn curve_order_matches_known_value() {
        assert_eq!(
            BigUint::from_bytes_be(CURVE_ORDER).to_string(),
            "52435875175126190479447740508185965837690552500527637822603658699938581184513",
        );
    }

    #[test]
    fn public_keys_match_known_values() {
        let expected_public_keys = [
            hex!("a99a76ed7796f7be22d5b7e85deeb7c5677e88e511e0b337618f8c4eb61349b4bf2d153f649f7b53359fe8b94a38e44c"),
            hex!("b89bebc699769726a318c8e9971bd3171297c61aea4a6578a7a4f94b547dcba5bac16a89108b6b6a1fe3695d1a874a0b"),
            hex!("a3a32b0f8b4ddb83f1a0a853d81dd725dfe577d4f4c3db8ece52ce2b026eca84815c1a7e8e92a4de3d755733bf7e4a9b"),
            hex!("88c141df77cd9d8d7a71a75c826c41a9c9f03c6ee1b180f3e7852f6a280099ded351b58d66e653af8e42816a4d8f532e"),
        ];

        for (expected, validator_index) in expected_public_keys.into_iter().zip(0..) {
            let actual = PublicKeyBytes::from(secret_key(validator_index).to_public_key());
            assert_eq!(actual, PublicKeyBytes::from(expected));
        }
    }

    #[test]
    fn deposit_proofs_are_valid_against_deposit_root() -> Result<()> {
        let config = Config::minimal();
        let deposit_data = (0..3)
            .map(|index| quick_start_deposit_data::<Minimal>(&config, &secret_key(index)))
            .collect::<Vec<_>>();

        let (deposits, deposit_root) = deposits_with_proofs(&deposit_data)?;

        for (deposit, index) in deposits.iter().zip(0..) {
            assert!(predicates::is_valid_merkle_branch(
                deposit.data.hash_tree_root(),
                deposit.proof.iter().copied(),
                index,
                deposit_root,
            ));
        }

        Ok(())
    }

    #[test]
    fn quick_start_validators_are_active_at_genesis() -> Result<()> {
        let config = Config::minimal();
        let count = NonZeroU64::new(16).expect("16 is nonzero");
        let state = quick_start_beacon_state::<Minimal>(&config, 0, count)?;

        assert_eq!(state.validators.len(), 16);
        assert_eq!(state.balances.len(), 16);
        assert_eq!(
            accessors::get_active_validator_indices(&state, GENESIS_EPOCH).count(),
            16,
        );
        assert_eq!(state.eth1_deposit_index, 16);

        Ok(())
    }

    #[test]
    fn genesis_block_root_matches_cached_header() -> Result<()> {
        let config = Config::minimal();
        let count = NonZeroU64::new(4).expect("4 is nonzero");
        let state = quick_start_beacon_state::<Minimal>(&config, 0, count)?;

        assert_eq!(
            genesis_block(&state).message.hash_tree_root(),
            accessors::latest_block_root(&state),
        );

        Ok(())
    }
}
