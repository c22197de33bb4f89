use log::debug;

/// Clock of the light gun's horizontal counter. X is reported in these ticks.
pub const DEVICE_CLOCK_HZ: f64 = 8_000_000.0;

/// Report the gun produces when aimed outside the visible area.
pub const OFFSCREEN_X: u16 = 0x0001;
pub const OFFSCREEN_Y: u16 = 0x000A;

/// Video timing services of the emulated GPU.
pub trait VideoTiming: Send {
    /// Convert window (host pixel) coordinates into display-surface coordinates.
    fn screen_to_display(&self, x: f32, y: f32) -> (f32, f32);

    /// Convert display coordinates into a `(tick, line)` pair of the video
    /// timing domain. Returns `None` outside the active area.
    fn display_to_beam(&self, x: f32, y: f32, x_scale: f32) -> Option<(u32, u32)>;

    /// Dot clock of the CRT controller in Hz.
    fn crtc_frequency(&self) -> u32;
}

/// Host pointer services of the input layer.
pub trait PointerSource: Send {
    /// Absolute pointer position in window coordinates.
    fn absolute_position(&self) -> (f32, f32);

    /// Current window size in host pixels.
    fn window_size(&self) -> (f32, f32);
}

/// Four relative half-axes, each in -1..1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RelativeAxes {
    pub left: f32,
    pub right: f32,
    pub up: f32,
    pub down: f32,
}

impl RelativeAxes {
    /// Collapse each pair of half-axes into a single 0..1 coordinate.
    pub fn normalized(&self) -> (f32, f32) {
        let x = if self.right > 0.0 { self.right } else { -self.left };
        let y = if self.down > 0.0 { self.down } else { -self.up };
        ((x + 1.0) * 0.5, (y + 1.0) * 0.5)
    }

    pub fn to_window(&self, window_size: (f32, f32)) -> (f32, f32) {
        let (x, y) = self.normalized();
        (x * window_size.0, y * window_size.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamPosition {
    pub x: u16,
    pub y: u16,
    pub offscreen: bool,
}

impl BeamPosition {
    pub const OFFSCREEN: Self = Self {
        x: OFFSCREEN_X,
        y: OFFSCREEN_Y,
        offscreen: true,
    };
}

/// Ratio between the CRTC dot clock and the gun's horizontal counter clock.
pub fn tick_divider(crtc_frequency: u32) -> f64 {
    f64::from(crtc_frequency) / DEVICE_CLOCK_HZ
}

/// Map a window-space pointer position to the gun's report coordinates.
///
/// Pure with respect to `video`: the same inputs always give the same result.
pub fn compute_position(
    video: &dyn VideoTiming,
    window_pos: (f32, f32),
    x_scale: f32,
    force_offscreen: bool,
) -> BeamPosition {
    let (window_x, window_y) = window_pos;
    let (display_x, display_y) = video.screen_to_display(window_x, window_y);

    if force_offscreen || display_x < 0.0 || display_y < 0.0 {
        debug!("GunCon: out of range for window coordinates {window_x:.0},{window_y:.0}");
        return BeamPosition::OFFSCREEN;
    }

    let Some((tick, line)) = video.display_to_beam(display_x, display_y, x_scale) else {
        debug!("GunCon: out of range for window coordinates {window_x:.0},{window_y:.0}");
        return BeamPosition::OFFSCREEN;
    };

    let divider = tick_divider(video.crtc_frequency());
    if divider <= 0.0 {
        return BeamPosition::OFFSCREEN;
    }

    let x = (f64::from(tick) / divider).round() as u16;
    let y = line as u16;
    debug!(
        "GunCon: display {display_x:.0},{display_y:.0} -> tick {tick} line {line} 8mhz ticks {x}"
    );

    BeamPosition {
        x,
        y,
        offscreen: false,
    }
}
