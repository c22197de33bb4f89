/// Width of a guest memory word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
}

/// Host lifecycle state as seen by background workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Shutdown,
    Starting,
    Running,
    Paused,
    Stopping,
}

impl RunState {
    /// Workers keep going while the machine runs or can resume.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// Read access to the emulated machine, safe to call from any thread.
///
/// Reads are not synchronized with the CPU thread and may observe a value
/// mid-update. Invalid addresses read as zero.
pub trait EmulationState: Send + Sync {
    fn read_u8(&self, addr: u32) -> u8;
    fn read_u16(&self, addr: u32) -> u16;
    fn read_u32(&self, addr: u32) -> u32;

    fn run_state(&self) -> RunState;

    fn read(&self, addr: u32, width: Width) -> u32 {
        match width {
            Width::U8 => u32::from(self.read_u8(addr)),
            Width::U16 => u32::from(self.read_u16(addr)),
            Width::U32 => self.read_u32(addr),
        }
    }
}

/// Main RAM size of the console.
pub const RAM_SIZE: usize = 2 * 1024 * 1024;
const PHYSICAL_MASK: u32 = 0x1FFF_FFFF;

/// Static snapshot of guest RAM, e.g. loaded from a memory dump.
///
/// Addresses are accepted in any of the KUSEG/KSEG0/KSEG1 mirrors.
pub struct RamImage {
    ram: Vec<u8>,
    run_state: RunState,
}

impl RamImage {
    pub fn new(mut ram: Vec<u8>) -> Self {
        ram.resize(RAM_SIZE, 0);
        Self {
            ram,
            run_state: RunState::Running,
        }
    }

    pub fn with_run_state(mut self, run_state: RunState) -> Self {
        self.run_state = run_state;
        self
    }

    fn offset(addr: u32, len: usize) -> Option<usize> {
        let phys = (addr & PHYSICAL_MASK) as usize;
        // RAM is mirrored four times over the first 8 MiB.
        if phys >= RAM_SIZE * 4 {
            return None;
        }
        let offset = phys % RAM_SIZE;
        (offset + len <= RAM_SIZE).then_some(offset)
    }

    fn bytes<const N: usize>(&self, addr: u32) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(offset) = Self::offset(addr, N) {
            out.copy_from_slice(&self.ram[offset..offset + N]);
        }
        out
    }
}

impl EmulationState for RamImage {
    fn read_u8(&self, addr: u32) -> u8 {
        self.bytes::<1>(addr)[0]
    }

    fn read_u16(&self, addr: u32) -> u16 {
        u16::from_le_bytes(self.bytes(addr))
    }

    fn read_u32(&self, addr: u32) -> u32 {
        u32::from_le_bytes(self.bytes(addr))
    }

    fn run_state(&self) -> RunState {
        self.run_state
    }
}
