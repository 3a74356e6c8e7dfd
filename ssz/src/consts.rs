pub const BITS_PER_BYTE: usize = 8;
pub const BYTES_PER_CHUNK: usize = 32;
pub const BITS_PER_CHUNK: usize = BYTES_PER_CHUNK * BITS_PER_BYTE;
