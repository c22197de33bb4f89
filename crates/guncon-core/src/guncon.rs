use std::sync::Arc;

use log::{info, trace, warn};

use crate::beam::{self, PointerSource, RelativeAxes, VideoTiming};
use crate::controller::{Controller, ControllerKind};
use crate::cursor::{self, CursorOverlay, CursorStyle};
use crate::memory::EmulationState;
use crate::protocol::{ReportState, TransferPhase};
use crate::recoil::{MonotonicClock, RecoilShared, RecoilWorker, RuleTable, WorkerConfig};
use crate::settings::{DEFAULT_CROSSHAIR_COLOR, GunConSettings};
use crate::signal::{ChannelOpener, SignalChannel};
use crate::state::{StateError, StateWrapper};

/// Number of digital bindings (trigger, A, B, shoot offscreen).
pub const BUTTON_COUNT: u32 = 4;
/// Digital bindings plus the four relative half-axes.
pub const BINDING_COUNT: u32 = 8;

const TRIGGER_BIT: u8 = 13;
const A_BIT: u8 = 3;
const B_BIT: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Binding {
    Trigger = 0,
    A = 1,
    B = 2,
    ShootOffscreen = 3,
    RelativeLeft = 4,
    RelativeRight = 5,
    RelativeUp = 6,
    RelativeDown = 7,
}

impl Binding {
    pub fn from_index(index: u32) -> Option<Self> {
        Some(match index {
            0 => Self::Trigger,
            1 => Self::A,
            2 => Self::B,
            3 => Self::ShootOffscreen,
            4 => Self::RelativeLeft,
            5 => Self::RelativeRight,
            6 => Self::RelativeUp,
            7 => Self::RelativeDown,
            _ => return None,
        })
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Bit of the report's button mask, for bindings that have one.
    fn button_bit(self) -> Option<u8> {
        match self {
            Self::Trigger => Some(TRIGGER_BIT),
            Self::A => Some(A_BIT),
            Self::B => Some(B_BIT),
            _ => None,
        }
    }
}

/// Frontend services a light gun needs.
pub struct GunConHost {
    pub video: Box<dyn VideoTiming>,
    pub pointer: Box<dyn PointerSource>,
    pub cursor: Box<dyn CursorOverlay>,
    pub emulation: Arc<dyn EmulationState>,
    pub channel_opener: Arc<dyn ChannelOpener>,
}

/// Namco GunCon light gun.
pub struct GunCon {
    port: u32,
    report: ReportState,
    host: GunConHost,
    settings: GunConSettings,
    has_relative_binds: bool,
    relative: RelativeAxes,
    /// Resolved `crosshair_color`, only re-parsed when the text changes.
    crosshair_color: u32,
    cursor: Option<CursorStyle>,
    trigger_held: bool,
    shoot_offscreen: bool,
    clock: MonotonicClock,
    shared: Arc<RecoilShared>,
    rules: RuleTable,
    active_title: Option<String>,
    recoil: Option<RecoilWorker>,
}

impl GunCon {
    pub fn new(port: u32, host: GunConHost) -> Self {
        Self {
            port,
            report: ReportState::default(),
            host,
            settings: GunConSettings::default(),
            has_relative_binds: false,
            relative: RelativeAxes::default(),
            crosshair_color: DEFAULT_CROSSHAIR_COLOR,
            cursor: None,
            trigger_held: false,
            shoot_offscreen: false,
            clock: MonotonicClock::new(),
            shared: Arc::new(RecoilShared::default()),
            rules: RuleTable::builtin(),
            active_title: None,
            recoil: None,
        }
    }

    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn report(&self) -> ReportState {
        self.report
    }

    pub fn settings(&self) -> &GunConSettings {
        &self.settings
    }

    pub fn has_relative_binds(&self) -> bool {
        self.has_relative_binds
    }

    /// Whether the last latched position was outside the visible area.
    pub fn offscreen(&self) -> bool {
        self.shared.offscreen()
    }

    pub fn active_title(&self) -> Option<&str> {
        self.active_title.as_deref()
    }

    pub fn recoil_running(&self) -> bool {
        self.recoil.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn cursor_slot(&self) -> u32 {
        cursor::pointer_slot(self.port, self.has_relative_binds)
    }

    /// Apply (re)loaded settings. Re-provisions the software cursor when its
    /// slot or appearance changed, releasing the old slot first.
    pub fn load_settings(&mut self, settings: &GunConSettings) {
        let restart_recoil = recoil_settings_changed(&self.settings, settings);

        let prev_slot = self.cursor_slot();
        self.has_relative_binds = settings.has_relative_binds();
        let new_slot = self.cursor_slot();

        if settings.crosshair_color != self.settings.crosshair_color {
            self.crosshair_color = settings.cursor_color();
        }
        let style = CursorStyle {
            image: settings.crosshair_image(),
            scale: settings.crosshair_scale,
            color: self.crosshair_color,
        };

        if prev_slot != new_slot || self.cursor.as_ref() != Some(&style) {
            if self.cursor.take().is_some() && cursor::slot_in_range(prev_slot) {
                self.host.cursor.clear_cursor(prev_slot);
            }
            if cursor::slot_in_range(new_slot) {
                self.host
                    .cursor
                    .set_cursor(new_slot, &style.image, style.scale, style.color);
                self.cursor = Some(style);
                self.update_cursor_position();
            }
        }

        self.settings = settings.clone();

        if restart_recoil {
            self.stop_recoil();
        }
        self.sync_recoil();
    }

    /// Publish the running title's identifier (empty or `None` when no disc
    /// is running).
    pub fn set_active_title(&mut self, title: Option<&str>) {
        let title = title.filter(|t| !t.is_empty()).map(str::to_owned);
        if title == self.active_title {
            // Same title again, e.g. once the host finished starting or
            // after it restarted: bring a missing worker up.
            self.sync_recoil();
            return;
        }
        self.active_title = title;

        let delivered = match (
            self.recoil.as_ref().filter(|w| !w.is_finished()),
            self.active_title.as_ref(),
        ) {
            (Some(worker), Some(title)) => worker.set_title(Some(title.clone())),
            _ => false,
        };
        if !delivered {
            self.sync_recoil();
        }
    }

    fn sync_recoil(&mut self) {
        let title = match (&self.active_title, self.settings.use_recoil) {
            (Some(title), true) => title.clone(),
            _ => {
                self.stop_recoil();
                return;
            }
        };

        if self.recoil_running() {
            return;
        }
        self.stop_recoil();

        if !self.host.emulation.run_state().is_active() {
            trace!("GunCon: port {} recoil deferred, host not running", self.port + 1);
            return;
        }

        let config = WorkerConfig {
            port: self.port,
            rules: self.rules,
            poll_interval: self.settings.poll_interval(),
            window: self.settings.recoil_window(),
            suppress_offscreen: self.settings.suppress_recoil_offscreen,
        };
        let channel = SignalChannel::new(Arc::clone(&self.host.channel_opener));

        match RecoilWorker::spawn(
            config,
            Arc::clone(&self.shared),
            self.clock,
            Arc::clone(&self.host.emulation),
            channel,
        ) {
            Ok(worker) => {
                info!("GunCon: port {} recoil enabled for {title}", self.port + 1);
                worker.set_title(Some(title));
                self.recoil = Some(worker);
            }
            Err(e) => warn!(
                "GunCon: failed to start recoil worker for port {}: {e}",
                self.port + 1
            ),
        }
    }

    fn stop_recoil(&mut self) {
        if let Some(mut worker) = self.recoil.take() {
            worker.stop();
        }
    }

    fn set_button(&mut self, bit: u8, pressed: bool) {
        if pressed {
            self.report.buttons &= !(1u16 << bit);
        } else {
            self.report.buttons |= 1u16 << bit;
        }
    }

    /// The trigger is held by its own binding or by shoot-offscreen.
    fn apply_trigger(&mut self) {
        let down = self.trigger_held || self.shoot_offscreen;
        let was_down = self.report.buttons & (1u16 << TRIGGER_BIT) == 0;
        self.set_button(TRIGGER_BIT, down);
        if down != was_down {
            self.shared.trigger.record(down, self.clock.now_us());
        }
    }

    fn relative_axis_mut(&mut self, binding: Binding) -> Option<&mut f32> {
        match binding {
            Binding::RelativeLeft => Some(&mut self.relative.left),
            Binding::RelativeRight => Some(&mut self.relative.right),
            Binding::RelativeUp => Some(&mut self.relative.up),
            Binding::RelativeDown => Some(&mut self.relative.down),
            _ => None,
        }
    }

    fn update_cursor_position(&mut self) {
        if self.cursor.is_none()
            || !self.has_relative_binds
            || !cursor::has_dedicated_slot(self.port)
        {
            return;
        }

        let (x, y) = self.relative.to_window(self.host.pointer.window_size());
        let slot = self.cursor_slot();
        self.host.cursor.set_cursor_position(slot, x, y);
    }
}

fn recoil_settings_changed(old: &GunConSettings, new: &GunConSettings) -> bool {
    old.use_recoil != new.use_recoil
        || old.suppress_recoil_offscreen != new.suppress_recoil_offscreen
        || old.recoil_poll_interval_ms != new.recoil_poll_interval_ms
        || old.recoil_window_ms != new.recoil_window_ms
}

fn latch_position(
    host: &GunConHost,
    relative: Option<&RelativeAxes>,
    x_scale: f32,
    force_offscreen: bool,
    shared: &RecoilShared,
) -> (u16, u16) {
    let window_pos = match relative {
        Some(axes) => axes.to_window(host.pointer.window_size()),
        None => host.pointer.absolute_position(),
    };
    let pos = beam::compute_position(host.video.as_ref(), window_pos, x_scale, force_offscreen);
    shared.set_offscreen(pos.offscreen);
    (pos.x, pos.y)
}

impl Controller for GunCon {
    fn kind(&self) -> ControllerKind {
        ControllerKind::GunCon
    }

    fn reset(&mut self) {
        self.report.reset_transfer();
    }

    fn do_state(&mut self, sw: &mut StateWrapper, apply_input_state: bool) -> Result<(), StateError> {
        let mut buttons = self.report.buttons;
        let mut position_x = self.report.position_x;
        let mut position_y = self.report.position_y;
        sw.do_u16(&mut buttons)?;
        sw.do_u16(&mut position_x)?;
        sw.do_u16(&mut position_y)?;
        if apply_input_state {
            self.report.buttons = buttons;
            self.report.position_x = position_x;
            self.report.position_y = position_y;
        }

        let mut phase = self.report.phase as u8;
        sw.do_u8(&mut phase)?;
        self.report.phase =
            TransferPhase::try_from(phase).map_err(|value| StateError::InvalidValue {
                field: "transfer_phase",
                value: u32::from(value),
            })?;
        Ok(())
    }

    fn bind_state(&self, index: u32) -> f32 {
        let Some(binding) = Binding::from_index(index) else {
            return 0.0;
        };

        if let Some(bit) = binding.button_bit() {
            return if self.report.buttons & (1u16 << bit) == 0 { 1.0 } else { 0.0 };
        }

        match binding {
            Binding::ShootOffscreen => {
                if self.shoot_offscreen {
                    1.0
                } else {
                    0.0
                }
            }
            Binding::RelativeLeft => self.relative.left,
            Binding::RelativeRight => self.relative.right,
            Binding::RelativeUp => self.relative.up,
            Binding::RelativeDown => self.relative.down,
            _ => 0.0,
        }
    }

    fn set_bind_state(&mut self, index: u32, value: f32) {
        let Some(binding) = Binding::from_index(index) else {
            return;
        };
        let pressed = value >= 0.5;

        match binding {
            Binding::Trigger => {
                self.trigger_held = pressed;
                self.apply_trigger();
            }
            Binding::A | Binding::B => {
                if let Some(bit) = binding.button_bit() {
                    self.set_button(bit, pressed);
                }
            }
            Binding::ShootOffscreen => {
                if self.shoot_offscreen != pressed {
                    self.shoot_offscreen = pressed;
                    self.apply_trigger();
                }
            }
            Binding::RelativeLeft
            | Binding::RelativeRight
            | Binding::RelativeUp
            | Binding::RelativeDown => {
                if !self.has_relative_binds {
                    return;
                }
                let value = value.clamp(-1.0, 1.0);
                let changed = match self.relative_axis_mut(binding) {
                    Some(axis) if *axis != value => {
                        *axis = value;
                        true
                    }
                    _ => false,
                };
                if changed {
                    self.update_cursor_position();
                }
            }
        }
    }

    fn reset_transfer_state(&mut self) {
        self.report.reset_transfer();
    }

    fn transfer(&mut self, data_in: u8) -> (u8, bool) {
        // Once per report: start recoil lazily if the host came up after
        // the title was published, or respawn it after a host restart.
        if self.report.phase == TransferPhase::XLsb {
            self.sync_recoil();
        }

        let relative = self.has_relative_binds.then_some(self.relative);
        let x_scale = self.settings.x_scale;
        let force_offscreen = self.shoot_offscreen;
        let host = &self.host;
        let shared = &self.shared;

        self.report.transfer(data_in, || {
            latch_position(host, relative.as_ref(), x_scale, force_offscreen, shared)
        })
    }
}

impl Drop for GunCon {
    fn drop(&mut self) {
        self.stop_recoil();

        let slot = self.cursor_slot();
        if self.cursor.take().is_some() && cursor::slot_in_range(slot) {
            self.host.cursor.clear_cursor(slot);
        }
    }
}
