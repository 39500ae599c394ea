//! Account name suffixes

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use uuid::Uuid;

use crate::error::BrokerError;

/// How the random part of an account name is generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserIdScheme {
    /// Hyphenated random UUID (36 characters)
    #[default]
    Uuid4,
    /// 8 random bytes, base58 encoded (up to 11 characters)
    Base58_64,
    /// 16 random bytes, base58 encoded (up to 22 characters)
    Base58_128,
}

impl UserIdScheme {
    /// Stored spelling
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uuid4 => "uuid4",
            Self::Base58_64 => "base58-64",
            Self::Base58_128 => "base58-128",
        }
    }

    /// Generate a fresh identifier
    pub fn generate(self) -> String {
        match self {
            Self::Uuid4 => Uuid::new_v4().to_string(),
            Self::Base58_64 => short_id(8),
            Self::Base58_128 => short_id(16),
        }
    }
}

impl fmt::Display for UserIdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserIdScheme {
    type Err = BrokerError;

    /// The empty string is what roles written before schemes existed carry;
    /// it means `uuid4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "uuid4" => Ok(Self::Uuid4),
            "base58-64" => Ok(Self::Base58_64),
            "base58-128" => Ok(Self::Base58_128),
            other => Err(BrokerError::InvalidUserIdScheme {
                scheme: other.to_string(),
            }),
        }
    }
}

/// `size` random bytes, base58 encoded
pub fn short_id(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    rand::rng().fill_bytes(&mut bytes);
    format_short_id(&bytes)
}

/// Base58 encoding of `bytes`; each leading zero byte becomes a `1`
pub fn format_short_id(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}
