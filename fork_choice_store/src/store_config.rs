use derivative::Derivative;

#[derive(Clone, Copy, Debug, Derivative)]
#[derivative(Default)]
pub struct StoreConfig {
    /// Slots into an epoch after which a justified checkpoint from another branch is deferred to
    /// the start of the next epoch.
    #[derivative(Default(value = "8"))]
    pub safe_slots_to_update_justified: u64,
}

impl StoreConfig {
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            safe_slots_to_update_justified: 2,
        }
    }
}
