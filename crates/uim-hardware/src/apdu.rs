//! Get Data command used to read a contactless card's UID.

use crate::error::{HardwareError, Result};

/// `Get Data` with P1 = 0x00 (UID), Le = 0x00 (full length).
pub const GET_DATA_UID_COMMAND: [u8; 5] = [0xff, 0xca, 0x00, 0x00, 0x00];

pub const UID_MIN_LENGTH: usize = 4;
pub const UID_MAX_LENGTH: usize = 10;
pub const STATUS_WORD_LENGTH: usize = 2;

/// Status word of a successful command.
pub const STATUS_SUCCESS: u16 = 0x9000;

pub const RESPONSE_MIN_LENGTH: usize = UID_MIN_LENGTH + STATUS_WORD_LENGTH;
pub const RESPONSE_MAX_LENGTH: usize = UID_MAX_LENGTH + STATUS_WORD_LENGTH;

/// Byte of the ATR identifying the card as one answering `Get Data`.
const ATR_CATEGORY_INDEX: usize = 5;
const ATR_CATEGORY_GET_DATA: u8 = 0x4f;

/// Whether a card with this ATR answers the `Get Data` UID command.
///
/// # Examples
///
/// ```
/// use uim_hardware::apdu::supports_get_data_uid;
///
/// assert!(supports_get_data_uid(&[0x3b, 0x8f, 0x80, 0x01, 0x80, 0x4f, 0x0c]));
/// assert!(!supports_get_data_uid(&[0x3b, 0x8f, 0x80, 0x01, 0x80]));
/// ```
#[must_use]
pub fn supports_get_data_uid(atr: &[u8]) -> bool {
    atr.get(ATR_CATEGORY_INDEX) == Some(&ATR_CATEGORY_GET_DATA)
}

/// Check that `atr` belongs to a card the identifier can be read from.
///
/// # Errors
///
/// Returns `HardwareError::UnsupportedCard` otherwise.
pub fn ensure_get_data_supported(atr: &[u8]) -> Result<()> {
    if supports_get_data_uid(atr) {
        Ok(())
    } else {
        Err(HardwareError::unsupported_card(format!(
            "ATR of {} bytes does not announce Get Data support",
            atr.len()
        )))
    }
}

/// Split a `Get Data` response into the UID, checking the trailing status
/// word.
///
/// # Errors
///
/// Returns `HardwareError::ResponseTooShort` if fewer than
/// [`RESPONSE_MIN_LENGTH`] bytes were received and
/// `HardwareError::CardStatus` if the status word is not `0x9000`.
pub fn parse_get_data_response(response: &[u8]) -> Result<Vec<u8>> {
    if response.len() < RESPONSE_MIN_LENGTH {
        return Err(HardwareError::ResponseTooShort {
            received: response.len(),
            expected: RESPONSE_MIN_LENGTH,
        });
    }

    let (uid, status) = response.split_at(response.len() - STATUS_WORD_LENGTH);
    let status = u16::from_be_bytes([status[0], status[1]]);
    if status != STATUS_SUCCESS {
        return Err(HardwareError::CardStatus { status });
    }

    Ok(uid.to_vec())
}
