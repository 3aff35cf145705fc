//! Integer ID to DragonLink wire code.
//!
//! The receiver firmware expects IDs in a hybrid decimal/hex layout. Values up
//! to 255 are sent as plain hex. Above that, the hundreds digit is sent
//! verbatim and the remaining two decimal digits are hex encoded, with a
//! zero filler when their hex form collapses to one digit. Below 10 the two
//! digits are sent as decimal text. The mapping is neither injective nor
//! reversible, so no decoder exists.

use crate::constants::{MAX_ID, MIN_ID};
use crate::error::DlError;
use std::fmt;
use tracing::debug;

/// Code produced by [`encode`], 1 to 3 characters long.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedId(String);

impl EncodedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The code left-padded to the packet field width.
    pub fn padded(&self) -> String {
        crate::packet::pad_code(&self.0)
    }
}

impl fmt::Display for EncodedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EncodedId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode `id` into the firmware's code format.
pub fn encode(id: i64) -> Result<EncodedId, DlError> {
    if !(MIN_ID..=MAX_ID).contains(&id) {
        return Err(DlError::EncodingRange { id });
    }

    let code = if id <= 0xFF {
        format!("{:x}", id)
    } else {
        // 256..=999 always has three decimal digits
        let upper = id / 100;
        let lower = id % 100;
        match lower {
            0..=9 => format!("{}{:02}", upper, lower),
            10..=15 => format!("{}0{:x}", upper, lower),
            _ => format!("{}{:x}", upper, lower),
        }
    };

    debug!(id, code = %code, "Encoded ID");
    Ok(EncodedId(code))
}
