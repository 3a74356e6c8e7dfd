use core::{fmt::Debug, hash::Hash, num::NonZeroU64};

use nonzero_ext::nonzero;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use strum::{Display, EnumString};
use typenum::{
    NonZero, Prod, Unsigned, U1099511627776, U128, U16, U16777216, U2, U2048, U256, U32, U4,
    U64, U65536, U8, U8192,
};

use crate::{config::Config, phase0::primitives::Gwei};

/// Compile-time configuration variables.
///
/// Lengths of collections are type-level numbers so that the collections can enforce them.
pub trait Preset: Copy + Eq + Ord + Hash + Default + Debug + Send + Sync + 'static {
    type EpochsPerEth1VotingPeriod: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type EpochsPerHistoricalRoot: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type EpochsPerHistoricalVector: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type EpochsPerSlashingsVector: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type HistoricalRootsLimit: Unsigned + Eq + Debug + Send + Sync;
    type MaxAttestations: Unsigned + Eq + Debug + Send + Sync;
    type MaxAttesterSlashings: Unsigned + Eq + Debug + Send + Sync;
    type MaxDeposits: Unsigned + Eq + Debug + Send + Sync;
    type MaxProposerSlashings: Unsigned + Eq + Debug + Send + Sync;
    type MaxValidatorsPerCommittee: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type MaxVoluntaryExits: Unsigned + Eq + Debug + Send + Sync;
    type SlotsPerEpoch: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type ValidatorRegistryLimit: Unsigned + NonZero + Eq + Debug + Send + Sync;

    // Derived type-level variables
    type MaxAttestationsPerEpoch: Unsigned + Eq + Debug + Send + Sync;
    type SlotsPerEth1VotingPeriod: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type SlotsPerHistoricalRoot: Unsigned + NonZero + Eq + Debug + Send + Sync;

    // Meta
    const NAME: PresetName;

    const BASE_REWARD_FACTOR: u64 = 64;
    const EFFECTIVE_BALANCE_INCREMENT: NonZeroU64 = nonzero!(1_000_000_000_u64);
    const HYSTERESIS_DOWNWARD_MULTIPLIER: u64 = 1;
    const HYSTERESIS_QUOTIENT: NonZeroU64 = nonzero!(4_u64);
    const HYSTERESIS_UPWARD_MULTIPLIER: u64 = 5;
    const INACTIVITY_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(1_u64 << 26);
    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(64_u64);
    const MAX_EFFECTIVE_BALANCE: Gwei = 32_000_000_000;
    const MAX_SEED_LOOKAHEAD: u64 = 4;
    const MIN_ATTESTATION_INCLUSION_DELAY: NonZeroU64 = NonZeroU64::MIN;
    const MIN_DEPOSIT_AMOUNT: Gwei = 1_000_000_000;
    const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64 = 4;
    const MIN_SEED_LOOKAHEAD: u64 = 1;
    const MIN_SLASHING_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(128_u64);
    const PROPORTIONAL_SLASHING_MULTIPLIER: u64 = 3;
    const PROPOSER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(8_u64);
    const SHUFFLE_ROUND_COUNT: u8 = 90;
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(128_u64);
    const WHISTLEBLOWER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(512_u64);

    /// Returns the default configuration associated with a preset.
    ///
    /// This should only be used in tests.
    #[must_use]
    fn default_config() -> Config {
        Self::NAME.default_config()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Mainnet;

impl Preset for Mainnet {
    type EpochsPerEth1VotingPeriod = U64;
    type EpochsPerHistoricalRoot = U256;
    type EpochsPerHistoricalVector = U65536;
    type EpochsPerSlashingsVector = U8192;
    type HistoricalRootsLimit = U16777216;
    type MaxAttestations = U128;
    type MaxAttesterSlashings = U2;
    type MaxDeposits = U16;
    type MaxProposerSlashings = U16;
    type MaxValidatorsPerCommittee = U2048;
    type MaxVoluntaryExits = U16;
    type SlotsPerEpoch = U32;
    type ValidatorRegistryLimit = U1099511627776;

    type MaxAttestationsPerEpoch = Prod<Self::MaxAttestations, Self::SlotsPerEpoch>;
    type SlotsPerEth1VotingPeriod = Prod<Self::EpochsPerEth1VotingPeriod, Self::SlotsPerEpoch>;
    type SlotsPerHistoricalRoot = Prod<Self::EpochsPerHistoricalRoot, Self::SlotsPerEpoch>;

    const NAME: PresetName = PresetName::Mainnet;
}

macro_rules! delegate_preset_items {
    (
        super $base_preset: ident;
        $(type $associated_type: ident;)*
    ) => {
        $(type $associated_type = <$base_preset as Preset>::$associated_type;)*
    };
}

/// Preset with short epochs and small windows, meant for tests.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Minimal;

impl Preset for Minimal {
    delegate_preset_items! {
        super Mainnet;

        type HistoricalRootsLimit;
        type MaxAttestations;
        type MaxAttesterSlashings;
        type MaxDeposits;
        type MaxProposerSlashings;
        type MaxValidatorsPerCommittee;
        type MaxVoluntaryExits;
        type ValidatorRegistryLimit;
    }

    type EpochsPerEth1VotingPeriod = U4;
    type EpochsPerHistoricalRoot = U8;
    type EpochsPerHistoricalVector = U64;
    type EpochsPerSlashingsVector = U64;
    type SlotsPerEpoch = U8;

    type MaxAttestationsPerEpoch = Prod<Self::MaxAttestations, Self::SlotsPerEpoch>;
    type SlotsPerEth1VotingPeriod = Prod<Self::EpochsPerEth1VotingPeriod, Self::SlotsPerEpoch>;
    type SlotsPerHistoricalRoot = Prod<Self::EpochsPerHistoricalRoot, Self::SlotsPerEpoch>;

    const NAME: PresetName = PresetName::Minimal;

    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(4_u64);
    const SHUFFLE_ROUND_COUNT: u8 = 10;
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(4_u64);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, DeserializeFromStr, SerializeDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum PresetName {
    Mainnet,
    Minimal,
}

impl PresetName {
    #[must_use]
    pub fn default_config(self) -> Config {
        match self {
            Self::Mainnet => Config::mainnet(),
            Self::Minimal => Config::minimal(),
        }
    }
}
