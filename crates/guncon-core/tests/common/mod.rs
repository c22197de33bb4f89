#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use guncon_core::beam::{PointerSource, VideoTiming};
use guncon_core::cursor::NullCursorOverlay;
use guncon_core::guncon::GunConHost;
use guncon_core::memory::{EmulationState, RunState};
use guncon_core::signal::{ChannelOpener, ChannelSide};

/// 640x480 display, one dot clock tick per 1/8 pixel at 64 MHz, so report X
/// equals the window X.
pub struct FlatVideo;

impl VideoTiming for FlatVideo {
    fn screen_to_display(&self, x: f32, y: f32) -> (f32, f32) {
        (x, y)
    }

    fn display_to_beam(&self, x: f32, y: f32, _x_scale: f32) -> Option<(u32, u32)> {
        (x < 640.0 && y < 480.0).then_some((x as u32 * 8, y as u32))
    }

    fn crtc_frequency(&self) -> u32 {
        64_000_000
    }
}

pub struct FixedPointer(pub f32, pub f32);

impl PointerSource for FixedPointer {
    fn absolute_position(&self) -> (f32, f32) {
        (self.0, self.1)
    }

    fn window_size(&self) -> (f32, f32) {
        (640.0, 480.0)
    }
}

/// Guest memory the test thread pokes while a worker reads it.
pub struct SharedMemory {
    words: Mutex<HashMap<u32, u32>>,
    run_state: Mutex<RunState>,
}

impl SharedMemory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            words: Mutex::new(HashMap::new()),
            run_state: Mutex::new(RunState::Running),
        })
    }

    pub fn set(&self, addr: u32, value: u32) {
        self.words.lock().unwrap().insert(addr, value);
    }

    pub fn get(&self, addr: u32) -> u32 {
        self.read_u32(addr)
    }

    pub fn set_run_state(&self, state: RunState) {
        *self.run_state.lock().unwrap() = state;
    }
}

impl EmulationState for SharedMemory {
    fn read_u8(&self, addr: u32) -> u8 {
        self.read_u32(addr) as u8
    }

    fn read_u16(&self, addr: u32) -> u16 {
        self.read_u32(addr) as u16
    }

    fn read_u32(&self, addr: u32) -> u32 {
        self.words.lock().unwrap().get(&addr).copied().unwrap_or(0)
    }

    fn run_state(&self) -> RunState {
        *self.run_state.lock().unwrap()
    }
}

/// Opener whose channels append complete lines to a shared log. The first
/// `fail_first` open attempts fail.
#[derive(Clone, Default)]
pub struct CollectingOpener {
    pub lines: Arc<Mutex<Vec<(ChannelSide, String)>>>,
    pub opens: Arc<AtomicUsize>,
    fail_first: usize,
}

impl CollectingOpener {
    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Self::default()
        }
    }

    pub fn tokens(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn sides(&self) -> Vec<ChannelSide> {
        self.lines.lock().unwrap().iter().map(|(side, _)| *side).collect()
    }
}

impl ChannelOpener for CollectingOpener {
    fn open(&self, side: ChannelSide) -> io::Result<Box<dyn Write + Send>> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(io::ErrorKind::NotFound.into());
        }
        Ok(Box::new(LineSink {
            side,
            pending: Vec::new(),
            lines: Arc::clone(&self.lines),
        }))
    }
}

struct LineSink {
    side: ChannelSide,
    pending: Vec<u8>,
    lines: Arc<Mutex<Vec<(ChannelSide, String)>>>,
}

impl Write for LineSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line[..end]).into_owned();
            self.lines.lock().unwrap().push((self.side, text));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn host(
    pointer: (f32, f32),
    emulation: Arc<dyn EmulationState>,
    opener: Arc<dyn ChannelOpener>,
) -> GunConHost {
    GunConHost {
        video: Box::new(FlatVideo),
        pointer: Box::new(FixedPointer(pointer.0, pointer.1)),
        cursor: Box::new(NullCursorOverlay),
        emulation,
        channel_opener: opener,
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
