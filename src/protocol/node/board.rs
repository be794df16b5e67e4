//! Board seam: silicon identity, image verification, and the terminal
//! entry points that leave the bootloader.
use crate::protocol::messages::UNIQUE_ID_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Verdict of the image-integrity checker, surfaced verbatim through
/// the vendor status byte.
pub enum FirmwareCheck {
    Ok = 0,
    NoAppSignature = 10,
    BadLengthApp = 11,
    BadBoardId = 12,
    BadCrc = 13,
    InUpdate = 14,
    Watchdog = 15,
    BadFirmwareSignature = 16,
    Verification = 17,
}

impl FirmwareCheck {
    /// Numeric code carried on the wire.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Platform services the bootloader core cannot provide itself.
pub trait Board {
    /// Copy the silicon unique id, right-padded with zeros when the
    /// device provides fewer than 16 significant bytes.
    fn read_unique_id(&self, out: &mut [u8; UNIQUE_ID_LEN]);
    /// Validate the application image currently in flash.
    fn check_firmware(&mut self) -> FirmwareCheck;
    /// Whether this boot was caused by a watchdog reset.
    fn was_watchdog_reset(&self) -> bool;
    /// Transfer control to the application image. Does not return.
    fn jump_to_app(&mut self) -> !;
    /// Hard system reset. Does not return.
    fn system_reset(&mut self) -> !;
}
