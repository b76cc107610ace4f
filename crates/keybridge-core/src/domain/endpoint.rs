//! Output transport endpoints.
//!
//! Every HID report event names the transport the report went out on.  The
//! firmware describes the active endpoint with a short human-readable string
//! (`"USB"`, `"BLE:0"`, `"None"`); [`Endpoint::from_transport_str`] turns that
//! string into the structured form carried on the wire.

/// Transport a HID report was sent over.
///
/// Wire values follow the `TransportType` enum of the event schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum TransportType {
    #[default]
    None = 0,
    Usb = 1,
    Ble = 2,
}

impl TransportType {
    /// Schema name of the transport, as printed by event watchers.
    pub fn name(self) -> &'static str {
        match self {
            TransportType::None => "TRANSPORT_NONE",
            TransportType::Usb => "TRANSPORT_USB",
            TransportType::Ble => "TRANSPORT_BLE",
        }
    }
}

impl TryFrom<i32> for TransportType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransportType::None),
            1 => Ok(TransportType::Usb),
            2 => Ok(TransportType::Ble),
            other => Err(other),
        }
    }
}

/// Endpoint sub-message: which transport, and which BLE profile when the
/// transport is [`TransportType::Ble`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    pub transport: TransportType,
    /// Only meaningful when `transport == TransportType::Ble`.
    pub ble_profile_index: u32,
}

impl Endpoint {
    /// Endpoint for the USB transport.
    pub const USB: Endpoint = Endpoint {
        transport: TransportType::Usb,
        ble_profile_index: 0,
    };

    /// Endpoint for BLE profile `index`.
    pub fn ble(index: u32) -> Self {
        Self {
            transport: TransportType::Ble,
            ble_profile_index: index,
        }
    }

    /// Parses a firmware transport descriptor.
    ///
    /// - anything starting with `"USB"` is the USB transport;
    /// - `"BLE:<n>"` is BLE profile `n`, where `n` is the run of leading decimal
    ///   digits after the colon (0 when there are none);
    /// - everything else maps to [`TransportType::None`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keybridge_core::domain::endpoint::{Endpoint, TransportType};
    ///
    /// assert_eq!(Endpoint::from_transport_str("BLE:3"), Endpoint::ble(3));
    /// assert_eq!(Endpoint::from_transport_str("USB").transport, TransportType::Usb);
    /// assert_eq!(Endpoint::from_transport_str("None"), Endpoint::default());
    /// ```
    pub fn from_transport_str(descriptor: &str) -> Self {
        if descriptor.starts_with("USB") {
            return Self::USB;
        }
        match descriptor.strip_prefix("BLE:") {
            Some(rest) => Self::ble(leading_decimal(rest)),
            None => Self::default(),
        }
    }
}

/// Value of the leading decimal digits of `s`, skipping leading whitespace and
/// accepting an optional sign.  Saturates instead of overflowing; a negative
/// value wraps into `u32` the same way a C cast of `atoi` would.
fn leading_decimal(s: &str) -> u32 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10)
                .saturating_add(i64::from(d - b'0'))
                .min(i64::from(i32::MAX) + 1)
        });
    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32 as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_descriptor_maps_to_usb() {
        assert_eq!(Endpoint::from_transport_str("USB"), Endpoint::USB);
    }

    #[test]
    fn test_usb_prefix_match_ignores_suffix() {
        assert_eq!(Endpoint::from_transport_str("USB:0").transport, TransportType::Usb);
    }

    #[test]
    fn test_ble_descriptor_carries_profile_index() {
        // Arrange / Act
        let ep = Endpoint::from_transport_str("BLE:2");

        // Assert
        assert_eq!(ep.transport, TransportType::Ble);
        assert_eq!(ep.ble_profile_index, 2);
    }

    #[test]
    fn test_ble_without_digits_is_profile_zero() {
        assert_eq!(Endpoint::from_transport_str("BLE:"), Endpoint::ble(0));
        assert_eq!(Endpoint::from_transport_str("BLE:x"), Endpoint::ble(0));
    }

    #[test]
    fn test_ble_stops_at_first_non_digit() {
        assert_eq!(Endpoint::from_transport_str("BLE:12abc"), Endpoint::ble(12));
    }

    #[test]
    fn test_ble_without_colon_is_none() {
        assert_eq!(Endpoint::from_transport_str("BLE"), Endpoint::default());
    }

    #[test]
    fn test_unknown_descriptor_maps_to_none() {
        for s in ["None", "", "usb", "bluetooth"] {
            assert_eq!(Endpoint::from_transport_str(s).transport, TransportType::None, "{s:?}");
        }
    }

    #[test]
    fn test_huge_profile_index_saturates() {
        assert_eq!(
            Endpoint::from_transport_str("BLE:99999999999").ble_profile_index,
            i32::MAX as u32
        );
    }

    #[test]
    fn test_transport_type_try_from_rejects_unknown_value() {
        assert_eq!(TransportType::try_from(2), Ok(TransportType::Ble));
        assert_eq!(TransportType::try_from(7), Err(7));
    }
}
