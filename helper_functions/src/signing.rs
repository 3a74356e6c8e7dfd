use anyhow::Result;
use bls::{CachedPublicKey, SecretKey, Signature, SignatureBytes};
use derive_more::From;
use ssz::SszHash;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{
            DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, DOMAIN_DEPOSIT, DOMAIN_RANDAO,
            DOMAIN_VOLUNTARY_EXIT,
        },
        containers::{AttestationData, BeaconBlock, BeaconBlockHeader, DepositMessage, VoluntaryExit},
        primitives::{DomainType, Epoch, H256},
    },
    preset::Preset,
};

use crate::{
    accessors,
    error::SignatureKind,
    misc,
    verifier::{SingleVerifier, Verifier as _},
};

// `Epoch` and `Slot` are aliases of the same type, so the epoch signed in a RANDAO reveal needs a
// wrapper to get its own implementation.
#[derive(Clone, Copy, From)]
pub struct RandaoEpoch(Epoch);

impl SszHash for RandaoEpoch {
    fn hash_tree_root(&self) -> H256 {
        self.0.hash_tree_root()
    }
}

/// Objects signed with the genesis fork version regardless of the state.
pub trait SignForAllForks: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(&self, config: &Config) -> H256 {
        let domain = misc::compute_domain(config, Self::DOMAIN_TYPE, None, None);
        misc::compute_signing_root(self, domain)
    }

    fn sign(&self, config: &Config, secret_key: &SecretKey) -> Signature {
        secret_key.sign(self.signing_root(config))
    }

    fn verify(
        &self,
        config: &Config,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
    ) -> Result<()> {
        SingleVerifier.verify_singular(
            self.signing_root(config),
            signature_bytes,
            cached_public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

/// Objects whose domain depends on the fork active at the epoch they refer to.
pub trait SignForSingleFork<P: Preset>: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn epoch(&self) -> Epoch;

    fn signing_root(&self, config: &Config, beacon_state: &BeaconState<P>) -> H256 {
        let epoch = Some(self.epoch());
        let domain = accessors::get_domain(config, beacon_state, Self::DOMAIN_TYPE, epoch);
        misc::compute_signing_root(self, domain)
    }

    fn sign(
        &self,
        config: &Config,
        beacon_state: &BeaconState<P>,
        secret_key: &SecretKey,
    ) -> Signature {
        secret_key.sign(self.signing_root(config, beacon_state))
    }

    fn verify(
        &self,
        config: &Config,
        beacon_state: &BeaconState<P>,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
    ) -> Result<()> {
        SingleVerifier.verify_singular(
            self.signing_root(config, beacon_state),
            signature_bytes,
            cached_public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

impl SignForAllForks for DepositMessage {
    const DOMAIN_TYPE: DomainType = DOMAIN_DEPOSIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Deposit;
}

impl<P: Preset> SignForSingleFork<P> for AttestationData {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_ATTESTER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Attestation;

    fn epoch(&self) -> Epoch {
        self.target.epoch
    }
}

impl<P: Preset> SignForSingleFork<P> for BeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

impl<P: Preset> SignForSingleFork<P> for BeaconBlockHeader {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

impl<P: Preset> SignForSingleFork<P> for RandaoEpoch {
    const DOMAIN_TYPE: DomainType = DOMAIN_RANDAO;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Randao;

    fn epoch(&self) -> Epoch {
        self.0
    }
}

impl<P: Preset> SignForSingleFork<P> for VoluntaryExit {
    const DOMAIN_TYPE: DomainType = DOMAIN_VOLUNTARY_EXIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::VoluntaryExit;

    fn epoch(&self) -> Epoch {
        self.epoch
    }
}
