use core::num::NonZeroU64;
use std::borrow::Cow;

use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};

use crate::{
    phase0::primitives::{Gwei, Version, H32},
    preset::PresetName,
};

/// Configuration variables customizable at runtime.
///
/// Unknown keys are ignored so that full network configuration files can be loaded directly.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    pub genesis_fork_version: Version,

    // Time parameters
    pub min_validator_withdrawability_delay: u64,
    pub seconds_per_slot: NonZeroU64,
    pub shard_committee_period: u64,

    // Validator cycle
    pub churn_limit_quotient: NonZeroU64,
    pub ejection_balance: Gwei,
    pub min_per_epoch_churn_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl Config {
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            preset_base: PresetName::Mainnet,

            genesis_fork_version: H32(hex!("00000000")),

            min_validator_withdrawability_delay: 256,
            seconds_per_slot: nonzero!(12_u64),
            shard_committee_period: 256,

            churn_limit_quotient: nonzero!(1_u64 << 16),
            ejection_balance: 16_000_000_000,
            min_per_epoch_churn_limit: 4,
        }
    }

    #[must_use]
    pub fn minimal() -> Self {
        Self {
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            genesis_fork_version: H32(hex!("00000001")),

            seconds_per_slot: nonzero!(6_u64),
            shard_committee_period: 64,

            churn_limit_quotient: nonzero!(32_u64),
            min_per_epoch_churn_limit: 2,

            ..Self::mainnet()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_mainnet() -> Result<(), serde_yaml::Error> {
        let yaml = "
            CONFIG_NAME: custom
            PRESET_BASE: minimal
            SHARD_COMMITTEE_PERIOD: 10
            DEPOSIT_CHAIN_ID: 1
        ";

        let config = serde_yaml::from_str::<Config>(yaml)?;

        assert_eq!(config.config_name, "custom");
        assert_eq!(config.preset_base, PresetName::Minimal);
        assert_eq!(config.shard_committee_period, 10);
        assert_eq!(config.ejection_balance, Config::mainnet().ejection_balance);

        Ok(())
    }

    #[test]
    fn fork_versions_are_hex_strings() -> Result<(), serde_yaml::Error> {
        let config = serde_yaml::from_str::<Config>("GENESIS_FORK_VERSION: '0x00000001'")?;

        assert_eq!(config.genesis_fork_version, Config::minimal().genesis_fork_version);

        Ok(())
    }
}
