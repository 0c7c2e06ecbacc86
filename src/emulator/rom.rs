use super::basics::ROM_CAPACITY;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

/// Why a ROM image could not be loaded.
#[derive(Debug, Error)]
pub enum RomError {
    #[error("cannot open ROM: {0}")]
    CannotOpen(#[source] io::Error),
    #[error("ROM is {size} bytes, program memory holds {}", ROM_CAPACITY)]
    TooLarge { size: usize },
    #[error("short read: expected {expected} bytes, read {read}")]
    ShortRead { expected: usize, read: usize },
}

/// Reads a raw ROM image from disk. Checks that the whole file arrived; the
/// size gate against program memory happens in
/// [`VirtualMachine::load_rom`](super::vm::VirtualMachine::load_rom).
pub fn read_rom_file(path: impl AsRef<Path>) -> Result<Vec<u8>, RomError> {
    let mut file = File::open(path).map_err(RomError::CannotOpen)?;
    let expected = file.metadata().map_err(RomError::CannotOpen)?.len() as usize;
    let mut bytes = Vec::with_capacity(expected);
    file.read_to_end(&mut bytes).map_err(RomError::CannotOpen)?;
    if bytes.len() < expected {
        return Err(RomError::ShortRead {
            expected,
            read: bytes.len(),
        });
    }
    Ok(bytes)
}
