//! Hex account address shared by every supported chain family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// A `0x`-prefixed hex address, always stored lower-cased.
///
/// EVM addresses carry 40 hex digits, StarkNet addresses up to 64, so the
/// only structural rule is a non-empty hex body of at most 64 digits.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub const PREFIX: &'static str = "0x";
    const MAX_DIGITS: usize = 64;

    /// Parse and normalise an address.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let lowered = raw.trim().to_ascii_lowercase();
        let body = lowered
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| TypesError::InvalidAddress(raw.to_string()))?;
        if body.is_empty()
            || body.len() > Self::MAX_DIGITS
            || !body.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(TypesError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(lowered))
    }

    /// The all-zero EVM address, used by most chains for the native currency.
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0[Self::PREFIX.len()..].chars().all(|c| c == '0')
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}
