//! GunCon light-gun peripheral emulation core.
//!
//! This crate contains the device-side logic of the light gun: the controller
//! bus protocol, the beam position latch, bindings and the software cursor,
//! and the recoil pipeline that watches guest memory and forwards shot events
//! to an external recoil device. Frontends wire it to their video, input and
//! memory subsystems through the traits in [`beam`], [`cursor`] and [`memory`].

/// Beam position latch: pointer to timing-domain coordinates.
pub mod beam;

/// Controller trait and device factory.
pub mod controller;

/// Software cursor overlay plumbing.
pub mod cursor;

/// The GunCon device itself.
pub mod guncon;

/// Guest memory and host run state.
pub mod memory;

/// Serial controller bus report protocol.
pub mod protocol;

/// Recoil event detection: rule table, tracker and background worker.
pub mod recoil;

/// Per-port device settings.
pub mod settings;

/// Outbound recoil signal channel.
pub mod signal;

/// Save-state field serialization.
pub mod state;
