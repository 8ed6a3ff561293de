//! Cycle-accurate Game Boy / Game Boy Color / Game Boy Advance emulation core.
//!
//! This crate contains the platform-agnostic emulator logic. Frontends live in
//! a separate crate and drive the core through the [`gb::GameBoy`] and
//! [`gba::Advance`] facades: run a frame's worth of cycles, take the finished
//! framebuffer, drain the audio queue, feed input events back in.

use std::path::Path;

use thiserror::Error;

/// Lock-free audio ring buffer connecting the core to the host audio thread.
pub mod audio_queue;

/// DMG/CGB machine: LR35902 CPU, bus, cartridge and peripherals.
pub mod gb;

/// AGB machine: ARM7TDMI CPU, bus, LCD, DMA, timers and direct sound.
pub mod gba;

/// Host audio output rate both cores resample to.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// The console a ROM runs on. Fixes register defaults, memory sizes, MBC
/// eligibility and the CPU kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    Dmg,
    Cgb,
    Agb,
}

/// Errors surfaced while loading a ROM, save file or BIOS. These are fatal:
/// the frontend prints the message and exits nonzero.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("refusing to load a .sav file as a ROM: {0}")]
    SaveFileAsRom(String),
    #[error("ROM size of {0} bytes is too small to be a Game Boy game")]
    RomTooSmall(usize),
    #[error("ROM size of {0} bytes is too large")]
    RomTooLarge(usize),
    #[error("no Nintendo logo found in the ROM header")]
    UnrecognizedRom,
    #[error("GBA BIOS not found (expected 16384-byte gba_bios.bin in the working directory or its parent)")]
    MissingBios,
    #[error("GBA BIOS has wrong size {0} (expected 16384 bytes)")]
    BadBiosSize(usize),
}

/// Fatal runtime conditions. Real hardware would lock up; the core reports
/// them to the host instead of spinning forever.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("The CPU has hung. Reason: {0}.")]
    Hung(&'static str),
}

// Compressed DMG boot logo, present at 0x104..0x134 of every licensed GB ROM.
const DMG_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00,
    0x0D, 0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD,
    0xD9, 0x99, 0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB,
    0xB9, 0x33, 0x3E,
];

// First bytes of the Huffman-coded AGB logo at 0x004..0x0A0 of a GBA ROM
// header. Matching a prefix is enough to tell the two header families apart.
const AGB_LOGO_PREFIX: [u8; 16] = [
    0x24, 0xFF, 0xAE, 0x51, 0x69, 0x9A, 0xA2, 0x21, 0x3D, 0x84, 0x82, 0x0A, 0x84, 0xE4, 0x09,
    0xAD,
];

const GB_MIN_ROM_SIZE: usize = 0x8000;
const GB_MAX_ROM_SIZE: usize = 8 * 1024 * 1024;
const AGB_MAX_ROM_SIZE: usize = 32 * 1024 * 1024;
pub const AGB_BIOS_SIZE: usize = 16 * 1024;

impl Console {
    /// Identify the target console from the ROM header logos.
    ///
    /// The first 0x134 bytes are enough: an AGB header carries the compressed
    /// logo at 0x04, a GB header carries its logo at 0x104 and declares CGB
    /// support through bit 7 of byte 0x143.
    pub fn detect(rom: &[u8]) -> Result<Console, LoadError> {
        if rom.len() >= 0xA0 && rom[0x04..0x14] == AGB_LOGO_PREFIX {
            if rom.len() > AGB_MAX_ROM_SIZE {
                return Err(LoadError::RomTooLarge(rom.len()));
            }
            return Ok(Console::Agb);
        }

        if rom.len() >= 0x134 && rom[0x104..0x134] == DMG_LOGO {
            if rom.len() < GB_MIN_ROM_SIZE {
                return Err(LoadError::RomTooSmall(rom.len()));
            }
            if rom.len() > GB_MAX_ROM_SIZE {
                return Err(LoadError::RomTooLarge(rom.len()));
            }
            let cgb = rom.get(0x143).copied().unwrap_or(0) & 0x80 != 0;
            return Ok(if cgb { Console::Cgb } else { Console::Dmg });
        }

        Err(LoadError::UnrecognizedRom)
    }

    pub fn is_gb(self) -> bool {
        matches!(self, Console::Dmg | Console::Cgb)
    }
}

/// Read a ROM image from disk, refusing save files and validating size
/// against the detected (or forced) console.
pub fn load_rom<P: AsRef<Path>>(path: P, forced: Option<Console>) -> Result<(Vec<u8>, Console), LoadError> {
    let path = path.as_ref();
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("sav")) {
        return Err(LoadError::SaveFileAsRom(path.display().to_string()));
    }

    let rom = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let console = match forced {
        Some(c) => {
            validate_rom_size(&rom, c)?;
            c
        }
        None => Console::detect(&rom)?,
    };

    Ok((rom, console))
}

fn validate_rom_size(rom: &[u8], console: Console) -> Result<(), LoadError> {
    match console {
        Console::Dmg | Console::Cgb => {
            if rom.len() < GB_MIN_ROM_SIZE {
                return Err(LoadError::RomTooSmall(rom.len()));
            }
            if rom.len() > GB_MAX_ROM_SIZE {
                return Err(LoadError::RomTooLarge(rom.len()));
            }
        }
        Console::Agb => {
            if rom.len() > AGB_MAX_ROM_SIZE {
                return Err(LoadError::RomTooLarge(rom.len()));
            }
        }
    }
    Ok(())
}

/// Locate and read `gba_bios.bin` from the working directory or its parent.
pub fn load_agb_bios() -> Result<Vec<u8>, LoadError> {
    for dir in [Path::new("."), Path::new("..")] {
        let candidate = dir.join("gba_bios.bin");
        if candidate.is_file() {
            let bios = std::fs::read(&candidate).map_err(|source| LoadError::Io {
                path: candidate.display().to_string(),
                source,
            })?;
            if bios.len() != AGB_BIOS_SIZE {
                return Err(LoadError::BadBiosSize(bios.len()));
            }
            return Ok(bios);
        }
    }
    Err(LoadError::MissingBios)
}

/// Input events the host delivers to the core. Each carries press/release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    L,
    R,
    Start,
    Select,
}

/// Resampling strategy for the 48 kHz host stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFilter {
    /// Biquad low-pass chain before decimation.
    #[default]
    Iir,
    /// Nearest-neighbor decimation.
    Nearest,
}
