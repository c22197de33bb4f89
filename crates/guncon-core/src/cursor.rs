use std::path::{Path, PathBuf};

/// Pointer slots reserved for host pointing devices (mice, touch).
pub const MAX_POINTER_DEVICES: u32 = 8;
/// Total software cursor slots; slots above the pointer devices belong to
/// controllers driving a cursor from relative axes.
pub const MAX_SOFTWARE_CURSORS: u32 = MAX_POINTER_DEVICES + 2;

/// Overlay renderer that draws software cursors.
pub trait CursorOverlay: Send {
    fn set_cursor(&mut self, slot: u32, image: &Path, scale: f32, color: u32);
    fn clear_cursor(&mut self, slot: u32);
    fn set_cursor_position(&mut self, slot: u32, x: f32, y: f32);
}

/// Overlay used when the frontend draws no software cursors.
#[derive(Default)]
pub struct NullCursorOverlay;

impl CursorOverlay for NullCursorOverlay {
    fn set_cursor(&mut self, _slot: u32, _image: &Path, _scale: f32, _color: u32) {}
    fn clear_cursor(&mut self, _slot: u32) {}
    fn set_cursor_position(&mut self, _slot: u32, _x: f32, _y: f32) {}
}

/// Resolved cursor appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorStyle {
    pub image: PathBuf,
    pub scale: f32,
    pub color: u32,
}

/// Slot a controller draws into. Absolute pointers share the first host
/// pointer's cursor; relative-axis controllers get a dedicated slot.
pub fn pointer_slot(port: u32, relative: bool) -> u32 {
    if relative { MAX_POINTER_DEVICES + port } else { 0 }
}

/// Whether a controller on `port` can own a dedicated cursor slot.
pub fn has_dedicated_slot(port: u32) -> bool {
    MAX_POINTER_DEVICES + port < MAX_SOFTWARE_CURSORS
}

pub fn slot_in_range(slot: u32) -> bool {
    slot < MAX_SOFTWARE_CURSORS
}
