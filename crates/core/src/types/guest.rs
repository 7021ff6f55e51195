//! Anonymous guest identifier.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`GuestId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuestIdError {
    /// The input has the wrong number of characters.
    #[error("guest id must be exactly {expected} characters (got {actual})")]
    WrongLength {
        /// Required length.
        expected: usize,
        /// Length of the input.
        actual: usize,
    },
    /// The input contains a character outside `A-Z0-9`.
    #[error("guest id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A device-persisted identifier standing in for an account during
/// unauthenticated checkout.
///
/// ## Constraints
///
/// - Exactly 16 characters
/// - Uppercase ASCII letters and digits only
///
/// ## Examples
///
/// ```
/// use bitebox_core::GuestId;
///
/// assert!(GuestId::parse("A1B2C3D4E5F6G7H8").is_ok());
///
/// assert!(GuestId::parse("").is_err());                  // empty
/// assert!(GuestId::parse("a1b2c3d4e5f6g7h8").is_err());  // lowercase
/// assert!(GuestId::parse("A1B2C3D4E5F6G7H").is_err());   // 15 chars
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct GuestId(String);

impl GuestId {
    /// Length of every guest id.
    pub const LENGTH: usize = 16;

    /// Characters a guest id is drawn from.
    pub const ALPHABET: &'static [u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Parse a `GuestId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not 16 characters long or contains
    /// anything other than uppercase letters and digits.
    pub fn parse(s: &str) -> Result<Self, GuestIdError> {
        let actual = s.chars().count();
        if actual != Self::LENGTH {
            return Err(GuestIdError::WrongLength {
                expected: Self::LENGTH,
                actual,
            });
        }

        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit()))
        {
            return Err(GuestIdError::InvalidCharacter(bad));
        }

        Ok(Self(s.to_owned()))
    }

    /// Build a guest id from alphabet indices.
    ///
    /// Each index is reduced modulo the alphabet size, so any source of
    /// random numbers can feed this directly.
    #[must_use]
    pub fn from_indices(indices: [usize; Self::LENGTH]) -> Self {
        let id = indices
            .iter()
            .map(|&i| char::from(Self::ALPHABET[i % Self::ALPHABET.len()]))
            .collect();
        Self(id)
    }

    /// Returns the guest id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GuestId {
    type Error = GuestIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GuestId> for String {
    fn from(id: GuestId) -> Self {
        id.0
    }
}
