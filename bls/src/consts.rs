pub const DOMAIN_SEPARATION_TAG: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

pub const PUBLIC_KEY_COMPRESSED_SIZE: usize = 48;
pub const SIGNATURE_COMPRESSED_SIZE: usize = 96;
