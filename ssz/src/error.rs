use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ReadError {
    #[error("expected vector to have {expected} elements, found {actual} elements")]
    VectorSizeMismatch { expected: usize, actual: usize },
    #[error("expected list to have no more than {maximum} elements, found {actual} elements")]
    ListTooLong { maximum: usize, actual: usize },
    #[error("expected bit list to have no more than {maximum} bits, found {actual} bits")]
    BitListTooLong { maximum: usize, actual: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[error("index {index} is out of bounds for collection of length {length}")]
pub struct IndexError {
    pub index: u64,
    pub length: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[error("list is full (maximum length: {maximum})")]
pub struct PushError {
    pub maximum: usize,
}
