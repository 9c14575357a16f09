#![allow(dead_code)]

use phosphor::nes::Nes;

pub const PRG_BANK: usize = 16 * 1024;
pub const CHR_BANK: usize = 8 * 1024;

/// Assemble an iNES image from raw PRG and CHR payloads.
pub fn ines_image(prg: &[u8], chr: &[u8], flags6: u8) -> Vec<u8> {
    assert_eq!(prg.len() % PRG_BANK, 0);
    assert_eq!(chr.len() % CHR_BANK, 0);
    let mut bytes = vec![
        b'N',
        b'E',
        b'S',
        0x1A,
        (prg.len() / PRG_BANK) as u8,
        (chr.len() / CHR_BANK) as u8,
        flags6,
        0,
    ];
    bytes.resize(16, 0);
    bytes.extend_from_slice(prg);
    bytes.extend_from_slice(chr);
    bytes
}

/// A 16 KiB PRG bank with `code` at $8000 and the reset vector pointing at
/// it. The bank mirrors into $C000-$FFFF, so the vectors live at the top
/// of the bank.
pub fn prg_with_code(code: &[u8]) -> Vec<u8> {
    let mut prg = vec![0u8; PRG_BANK];
    prg[..code.len()].copy_from_slice(code);
    prg[PRG_BANK - 4] = 0x00; // $FFFC
    prg[PRG_BANK - 3] = 0x80; // $FFFD
    prg
}

pub fn boot_image(prg: &[u8], chr: &[u8]) -> Nes {
    let image = ines_image(prg, chr, 0);
    let mut nes = Nes::new();
    nes.load_rom_from_bytes(&image).unwrap();
    nes
}

/// Boot a console running `code` from $8000 with 8 KiB of CHR-RAM.
pub fn boot(code: &[u8]) -> Nes {
    boot_image(&prg_with_code(code), &[])
}

/// An infinite `JMP $8000` loop; keeps the CPU busy without touching
/// anything while a test drives the hardware through the bus.
pub fn boot_idle() -> Nes {
    boot(&[0x4C, 0x00, 0x80])
}
