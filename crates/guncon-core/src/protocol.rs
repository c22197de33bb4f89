/// Device identifier reported after the `0x42` read command.
pub const GUNCON_ID: u16 = 0x5A63;

/// Host byte that selects the device and starts an exchange.
pub const CMD_SELECT: u8 = 0x01;
/// Host byte requesting a report.
pub const CMD_READ: u8 = 0x42;

/// Value driven on the data line when the device has nothing to say.
const HIGH_Z: u8 = 0xFF;

/// Step of the serial exchange between the controller port and the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransferPhase {
    #[default]
    Idle = 0,
    Ready = 1,
    IdMsb = 2,
    ButtonsLsb = 3,
    ButtonsMsb = 4,
    XLsb = 5,
    XMsb = 6,
    YLsb = 7,
    YMsb = 8,
}

impl TryFrom<u8> for TransferPhase {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Idle,
            1 => Self::Ready,
            2 => Self::IdMsb,
            3 => Self::ButtonsLsb,
            4 => Self::ButtonsMsb,
            5 => Self::XLsb,
            6 => Self::XMsb,
            7 => Self::YLsb,
            8 => Self::YMsb,
            other => return Err(other),
        })
    }
}

/// Protocol-visible state of one light gun.
///
/// Buttons are active low. Positions are in report units: 8 MHz ticks for X
/// and scanlines for Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportState {
    pub buttons: u16,
    pub position_x: u16,
    pub position_y: u16,
    pub phase: TransferPhase,
}

impl Default for ReportState {
    fn default() -> Self {
        Self {
            buttons: 0xFFFF,
            position_x: 0,
            position_y: 0,
            phase: TransferPhase::Idle,
        }
    }
}

impl ReportState {
    pub fn reset_transfer(&mut self) {
        self.phase = TransferPhase::Idle;
    }

    /// Exchange one byte with the host.
    ///
    /// Returns the byte driven back and whether the device expects the
    /// exchange to continue. `latch` is called exactly once per report, right
    /// before the X low byte goes out, and returns the fresh `(x, y)` pair.
    pub fn transfer(&mut self, data_in: u8, latch: impl FnOnce() -> (u16, u16)) -> (u8, bool) {
        match self.phase {
            TransferPhase::Idle => {
                if data_in == CMD_SELECT {
                    self.phase = TransferPhase::Ready;
                    (HIGH_Z, true)
                } else {
                    (HIGH_Z, false)
                }
            }
            TransferPhase::Ready => {
                if data_in == CMD_READ {
                    self.phase = TransferPhase::IdMsb;
                    (GUNCON_ID as u8, true)
                } else {
                    log::trace!("GunCon: unknown command 0x{data_in:02X}, aborting exchange");
                    self.phase = TransferPhase::Idle;
                    (HIGH_Z, false)
                }
            }
            TransferPhase::IdMsb => {
                self.phase = TransferPhase::ButtonsLsb;
                ((GUNCON_ID >> 8) as u8, true)
            }
            TransferPhase::ButtonsLsb => {
                self.phase = TransferPhase::ButtonsMsb;
                (self.buttons as u8, true)
            }
            TransferPhase::ButtonsMsb => {
                self.phase = TransferPhase::XLsb;
                ((self.buttons >> 8) as u8, true)
            }
            TransferPhase::XLsb => {
                let (x, y) = latch();
                self.position_x = x;
                self.position_y = y;
                self.phase = TransferPhase::XMsb;
                (self.position_x as u8, true)
            }
            TransferPhase::XMsb => {
                self.phase = TransferPhase::YLsb;
                ((self.position_x >> 8) as u8, true)
            }
            TransferPhase::YLsb => {
                self.phase = TransferPhase::YMsb;
                (self.position_y as u8, true)
            }
            TransferPhase::YMsb => {
                self.phase = TransferPhase::Idle;
                ((self.position_y >> 8) as u8, false)
            }
        }
    }
}
