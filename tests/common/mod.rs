#![allow(dead_code)]

use dotmatrix_core::cartridge::Cartridge;
use dotmatrix_core::gameboy::GameBoy;

/// Assemble a 32 KiB MBC0 image with `code` placed at the 0x0100 entry
/// point, where execution begins.
pub fn rom_with(code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + code.len()].copy_from_slice(code);
    rom
}

pub fn gameboy_with(code: &[u8]) -> GameBoy {
    GameBoy::new(Cartridge::new(rom_with(code)).unwrap())
}

/// Step the CPU until it halts, without advancing the peripherals.
pub fn run_until_halt(gb: &mut GameBoy) {
    for _ in 0..10_000 {
        gb.cpu.step(&mut gb.bus);
        if gb.cpu.halted {
            return;
        }
    }
    panic!("program never reached HALT");
}

/// (Z, N, H, C) from the flag register.
pub fn flags(gb: &GameBoy) -> (bool, bool, bool, bool) {
    let f = gb.cpu.f;
    (f & 0x80 != 0, f & 0x40 != 0, f & 0x20 != 0, f & 0x10 != 0)
}
