/// Fallible equivalent of [`FromIterator`].
///
/// Collections with a fixed or maximum length cannot be built from an arbitrary iterator.
/// [`TryFrom`] cannot be used instead due to coherence rules.
pub trait TryFromIterator<T>: Sized {
    type Error;

    fn try_from_iter(items: impl IntoIterator<Item = T>) -> Result<Self, Self::Error>;
}
