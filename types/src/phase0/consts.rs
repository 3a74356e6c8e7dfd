use core::num::NonZeroU64;

use hex_literal::hex;
use nonzero_ext::nonzero;
use typenum::{Add1, U32, U4, U64};

use crate::phase0::primitives::{DomainType, Epoch, Slot, H32};

pub const BASE_REWARDS_PER_EPOCH: NonZeroU64 = nonzero!(4_u64);
pub const DOMAIN_BEACON_ATTESTER: DomainType = H32(hex!("01000000"));
pub const DOMAIN_BEACON_PROPOSER: DomainType = H32(hex!("00000000"));
pub const DOMAIN_DEPOSIT: DomainType = H32(hex!("03000000"));
pub const DOMAIN_RANDAO: DomainType = H32(hex!("02000000"));
pub const DOMAIN_VOLUNTARY_EXIT: DomainType = H32(hex!("04000000"));
pub const FAR_FUTURE_EPOCH: Epoch = Epoch::MAX;
pub const GENESIS_EPOCH: Epoch = 0;
pub const GENESIS_SLOT: Slot = 0;

pub type AttestationSubnetCount = U64;
pub type DepositContractTreeDepth = U32;
pub type JustificationBitsLength = U4;

/// Deposit proofs include the length mixed into the deposit root.
pub type DepositProofLength = Add1<DepositContractTreeDepth>;
