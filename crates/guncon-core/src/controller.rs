use crate::guncon::{self, GunCon, GunConHost};
use crate::state::{StateError, StateWrapper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    GunCon,
}

impl ControllerKind {
    pub const ALL: [Self; 1] = [Self::GunCon];

    pub fn name(self) -> &'static str {
        match self {
            Self::GunCon => "GunCon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn binding_count(self) -> u32 {
        match self {
            Self::GunCon => guncon::BINDING_COUNT,
        }
    }

    /// Build a device of this kind for `port`.
    pub fn create(self, port: u32, host: GunConHost) -> Box<dyn Controller> {
        match self {
            Self::GunCon => Box::new(GunCon::new(port, host)),
        }
    }
}

/// A device plugged into a controller port.
pub trait Controller: Send {
    fn kind(&self) -> ControllerKind;

    /// Power-on / port reset.
    fn reset(&mut self);

    /// Serialize or restore the device's save-state fields. Input fields are
    /// only applied when `apply_input_state` is set.
    fn do_state(&mut self, sw: &mut StateWrapper, apply_input_state: bool) -> Result<(), StateError>;

    /// Current value of a binding, 0.0 for unknown indices.
    fn bind_state(&self, index: u32) -> f32;

    fn set_bind_state(&mut self, index: u32, value: f32);

    /// Abort any exchange in progress (bus reset / port deselect).
    fn reset_transfer_state(&mut self);

    /// Exchange one byte; returns the reply and whether more bytes follow.
    fn transfer(&mut self, data_in: u8) -> (u8, bool);
}
