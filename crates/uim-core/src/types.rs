use crate::{Result, constants::IDENTIFIER_SEPARATOR, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seat slot an identified occupant is associated with.
///
/// `0x0000` is the main user seat and `0xffff` means the seat is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(u16);

impl SeatId {
    pub const MIN: SeatId = SeatId(0x0000);
    pub const MAX: SeatId = SeatId(0xffff);
    pub const MAIN_USER: SeatId = SeatId(0x0000);
    pub const UNDEFINED: SeatId = SeatId(0xffff);

    #[must_use]
    pub const fn new(id: u16) -> Self {
        SeatId(id)
    }

    /// Parse a seat id written as `0x` followed by hexadecimal digits.
    ///
    /// No sign, whitespace or empty digit string is accepted and the value
    /// must fit in 16 bits.
    ///
    /// # Errors
    /// Returns `Error::InvalidSeatId` if the string does not follow that format.
    ///
    /// # Examples
    ///
    /// ```
    /// use uim_core::SeatId;
    ///
    /// assert_eq!(SeatId::from_hex_str("0x5678").unwrap().as_u16(), 0x5678);
    /// assert!(SeatId::from_hex_str("0x10000").is_err());
    /// assert!(SeatId::from_hex_str("5678").is_err());
    /// ```
    pub fn from_hex_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidSeatId(format!("missing 0x prefix: {s:?}")))?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidSeatId(format!(
                "expected hexadecimal digits: {s:?}"
            )));
        }

        u16::from_str_radix(digits, 16)
            .map(SeatId)
            .map_err(|_| Error::InvalidSeatId(format!("out of 16 bit range: {s:?}")))
    }

    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn is_main_user(&self) -> bool {
        *self == Self::MAIN_USER
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        *self == Self::UNDEFINED
    }
}

impl Default for SeatId {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl From<u16> for SeatId {
    fn from(id: u16) -> Self {
        SeatId(id)
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl std::str::FromStr for SeatId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SeatId::from_hex_str(s)
    }
}

/// A user identified by one of the identification sources.
///
/// Immutable once constructed. The identification id always starts with the
/// tag of the mechanism that produced it, see [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifiedUser {
    identification_id: String,
    seat_id: SeatId,
}

impl IdentifiedUser {
    pub fn new(identification_id: impl Into<String>, seat_id: SeatId) -> Self {
        Self {
            identification_id: identification_id.into(),
            seat_id,
        }
    }

    /// Create a user whose id is `tag` and `suffix` joined by the identifier
    /// separator.
    ///
    /// # Examples
    ///
    /// ```
    /// use uim_core::{IdentifiedUser, SeatId};
    ///
    /// let user = IdentifiedUser::tagged("MSD", "1234", SeatId::new(0x5678));
    /// assert_eq!(user.identification_id(), "MSD-1234");
    /// ```
    pub fn tagged(tag: &str, suffix: &str, seat_id: SeatId) -> Self {
        Self::new(format!("{tag}{IDENTIFIER_SEPARATOR}{suffix}"), seat_id)
    }

    #[must_use]
    pub fn identification_id(&self) -> &str {
        &self.identification_id
    }

    #[must_use]
    pub fn seat_id(&self) -> SeatId {
        self.seat_id
    }
}

impl fmt::Display for IdentifiedUser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}, {}", self.identification_id, self.seat_id)
    }
}

/// Render bytes as lowercase hexadecimal, two characters per byte.
///
/// # Examples
///
/// ```
/// use uim_core::render_hex;
///
/// assert_eq!(render_hex(&[0x12, 0xab]), "12ab");
/// ```
#[must_use]
pub fn render_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
