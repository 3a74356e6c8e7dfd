use ethereum_types::H256;

pub trait SszHash {
    fn hash_tree_root(&self) -> H256;

    /// Chunks that a sequence of values is Merkleized from.
    ///
    /// Composite values occupy one chunk each. Basic values override this to pack several of them
    /// into a single chunk.
    fn chunks(values: &[Self]) -> Vec<H256>
    where
        Self: Sized,
    {
        values.iter().map(Self::hash_tree_root).collect()
    }

    /// Number of chunks needed for `length` values. Must agree with [`SszHash::chunks`].
    #[must_use]
    fn chunk_count(length: usize) -> usize
    where
        Self: Sized,
    {
        length
    }
}
