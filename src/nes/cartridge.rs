use std::io;
use std::path::Path;
use std::{fmt, fs};

use thiserror::Error;

const PRG_BANK_SIZE: usize = 16 * 1024;
const CHR_BANK_SIZE: usize = 8 * 1024;
const PRG_RAM_SIZE: usize = 8 * 1024;
const TRAINER_SIZE: usize = 512;
const HEADER_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("failed to read ROM file")]
    Io(#[from] io::Error),
    #[error("not an iNES image (bad magic)")]
    NotInes,
    #[error("mapper {0} is not supported, only NROM (mapper 0)")]
    UnsupportedMapper(u8),
    #[error("ROM truncated while reading {0}")]
    Truncated(&'static str),
    #[error("header declares no PRG-ROM")]
    EmptyPrgRom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

impl fmt::Display for Mirroring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mirroring::Horizontal => write!(f, "horizontal"),
            Mirroring::Vertical => write!(f, "vertical"),
            Mirroring::FourScreen => write!(f, "four-screen"),
        }
    }
}

/// An NROM (mapper 0) cartridge: fixed PRG/CHR, no bank switching.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub mirroring: Mirroring,
    pub battery: bool,
    prg_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
}

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self, CartridgeError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CartridgeError::NotInes);
        }
        if &bytes[0..4] != b"NES\x1A" {
            return Err(CartridgeError::NotInes);
        }

        let flags6 = bytes[6];
        let flags7 = bytes[7];
        let mapper = (flags6 >> 4) | (flags7 & 0xF0);
        if mapper != 0 {
            return Err(CartridgeError::UnsupportedMapper(mapper));
        }

        let mirroring = if flags6 & 0x08 != 0 {
            Mirroring::FourScreen
        } else if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let battery = flags6 & 0x02 != 0;

        let prg_size = bytes[4] as usize * PRG_BANK_SIZE;
        if prg_size == 0 {
            return Err(CartridgeError::EmptyPrgRom);
        }
        let chr_size = bytes[5] as usize * CHR_BANK_SIZE;

        let mut cursor = HEADER_SIZE;
        if flags6 & 0x04 != 0 {
            if bytes.len() < cursor + TRAINER_SIZE {
                return Err(CartridgeError::Truncated("trainer"));
            }
            cursor += TRAINER_SIZE;
        }

        if bytes.len() < cursor + prg_size {
            return Err(CartridgeError::Truncated("PRG-ROM"));
        }
        let prg_rom = bytes[cursor..cursor + prg_size].to_vec();
        cursor += prg_size;

        let (chr, chr_is_ram) = if chr_size == 0 {
            (vec![0u8; CHR_BANK_SIZE], true)
        } else {
            if bytes.len() < cursor + chr_size {
                return Err(CartridgeError::Truncated("CHR-ROM"));
            }
            (bytes[cursor..cursor + chr_size].to_vec(), false)
        };

        Ok(Self {
            mirroring,
            battery,
            prg_rom,
            prg_ram: vec![0u8; PRG_RAM_SIZE],
            chr,
            chr_is_ram,
        })
    }

    /// CPU view: PRG-RAM at $6000-$7FFF, PRG-ROM mirrored across $8000-$FFFF.
    /// A 16 KiB image repeats in both halves of the ROM window.
    pub fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr - 0x6000) as usize],
            0x8000..=0xFFFF => {
                let offset = (addr - 0x8000) as usize % self.prg_rom.len();
                self.prg_rom[offset]
            }
            _ => 0,
        }
    }

    /// PRG-RAM accepts writes; the ROM window ignores them on NROM.
    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        if let 0x6000..=0x7FFF = addr {
            self.prg_ram[(addr - 0x6000) as usize] = value;
        }
    }

    /// PPU view of the pattern tables at $0000-$1FFF.
    pub fn chr_read(&self, addr: u16) -> u8 {
        self.chr[addr as usize % self.chr.len()]
    }

    pub fn chr_write(&mut self, addr: u16, value: u8) {
        if self.chr_is_ram {
            let index = addr as usize % self.chr.len();
            self.chr[index] = value;
        }
    }

    pub fn chr_is_ram(&self) -> bool {
        self.chr_is_ram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ines(prg_banks: u8, chr_banks: u8, flags6: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![b'N', b'E', b'S', 0x1A, prg_banks, chr_banks, flags6, 0];
        bytes.resize(HEADER_SIZE, 0);
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 64];
        assert!(matches!(
            Cartridge::from_bytes(&bytes),
            Err(CartridgeError::NotInes)
        ));
    }

    #[test]
    fn rejects_unsupported_mapper() {
        let body = vec![0u8; PRG_BANK_SIZE];
        let bytes = ines(1, 0, 0x40, &body);
        assert!(matches!(
            Cartridge::from_bytes(&bytes),
            Err(CartridgeError::UnsupportedMapper(4))
        ));
    }

    #[test]
    fn rejects_truncated_prg() {
        let body = vec![0u8; PRG_BANK_SIZE / 2];
        let bytes = ines(1, 0, 0, &body);
        assert!(matches!(
            Cartridge::from_bytes(&bytes),
            Err(CartridgeError::Truncated("PRG-ROM"))
        ));
    }

    #[test]
    fn skips_trainer_when_present() {
        let mut body = vec![0xEE; TRAINER_SIZE];
        let mut prg = vec![0u8; PRG_BANK_SIZE];
        prg[0] = 0x42;
        body.extend_from_slice(&prg);
        let bytes = ines(1, 0, 0x04, &body);
        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert_eq!(cart.cpu_read(0x8000), 0x42);
    }

    #[test]
    fn sixteen_kib_prg_mirrors_into_upper_bank() {
        let mut prg = vec![0u8; PRG_BANK_SIZE];
        prg[0] = 0x42;
        let bytes = ines(1, 0, 0, &prg);
        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert_eq!(cart.cpu_read(0x8000), 0x42);
        assert_eq!(cart.cpu_read(0xC000), 0x42);
    }

    #[test]
    fn chr_ram_allocated_when_no_chr_rom() {
        let prg = vec![0u8; PRG_BANK_SIZE];
        let bytes = ines(1, 0, 0, &prg);
        let mut cart = Cartridge::from_bytes(&bytes).unwrap();
        assert!(cart.chr_is_ram());
        cart.chr_write(0x0123, 0x77);
        assert_eq!(cart.chr_read(0x0123), 0x77);
    }

    #[test]
    fn chr_rom_ignores_writes() {
        let mut body = vec![0u8; PRG_BANK_SIZE];
        body.extend_from_slice(&vec![0x11; CHR_BANK_SIZE]);
        let bytes = ines(1, 1, 0, &body);
        let mut cart = Cartridge::from_bytes(&bytes).unwrap();
        assert!(!cart.chr_is_ram());
        cart.chr_write(0x0000, 0x77);
        assert_eq!(cart.chr_read(0x0000), 0x11);
    }

    #[test]
    fn prg_ram_round_trips() {
        let prg = vec![0u8; PRG_BANK_SIZE];
        let bytes = ines(1, 0, 0, &prg);
        let mut cart = Cartridge::from_bytes(&bytes).unwrap();
        cart.cpu_write(0x6000, 0xA5);
        cart.cpu_write(0x7FFF, 0x5A);
        assert_eq!(cart.cpu_read(0x6000), 0xA5);
        assert_eq!(cart.cpu_read(0x7FFF), 0x5A);
    }

    #[test]
    fn mirroring_parsed_from_flags() {
        let prg = vec![0u8; PRG_BANK_SIZE];
        let vertical = Cartridge::from_bytes(&ines(1, 0, 0x01, &prg)).unwrap();
        assert_eq!(vertical.mirroring, Mirroring::Vertical);
        let horizontal = Cartridge::from_bytes(&ines(1, 0, 0x00, &prg)).unwrap();
        assert_eq!(horizontal.mirroring, Mirroring::Horizontal);
        let four = Cartridge::from_bytes(&ines(1, 0, 0x08, &prg)).unwrap();
        assert_eq!(four.mirroring, Mirroring::FourScreen);
    }
}
