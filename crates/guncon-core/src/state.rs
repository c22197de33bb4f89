use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("save state truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid {field} value {value} in save state")]
    InvalidValue { field: &'static str, value: u32 },
}

enum Mode {
    Read { data: Vec<u8>, pos: usize },
    Write { data: Vec<u8> },
}

/// Bidirectional save-state stream.
///
/// Devices describe their field list once through `do_*` calls; the same code
/// path then either serializes or restores depending on the wrapper mode.
/// Values are little-endian.
pub struct StateWrapper {
    mode: Mode,
}

impl StateWrapper {
    pub fn writer() -> Self {
        Self {
            mode: Mode::Write { data: Vec::new() },
        }
    }

    pub fn reader(data: Vec<u8>) -> Self {
        Self {
            mode: Mode::Read { data, pos: 0 },
        }
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.mode, Mode::Read { .. })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.mode {
            Mode::Read { data, .. } | Mode::Write { data } => data,
        }
    }

    pub fn do_u8(&mut self, value: &mut u8) -> Result<(), StateError> {
        let mut buf = [*value];
        self.do_bytes(&mut buf)?;
        *value = buf[0];
        Ok(())
    }

    pub fn do_u16(&mut self, value: &mut u16) -> Result<(), StateError> {
        let mut buf = value.to_le_bytes();
        self.do_bytes(&mut buf)?;
        *value = u16::from_le_bytes(buf);
        Ok(())
    }

    fn do_bytes(&mut self, buf: &mut [u8]) -> Result<(), StateError> {
        match &mut self.mode {
            Mode::Write { data } => {
                data.extend_from_slice(buf);
                Ok(())
            }
            Mode::Read { data, pos } => {
                let end = *pos + buf.len();
                let Some(src) = data.get(*pos..end) else {
                    return Err(StateError::Truncated {
                        offset: *pos,
                        needed: buf.len(),
                    });
                };
                buf.copy_from_slice(src);
                *pos = end;
                Ok(())
            }
        }
    }
}
