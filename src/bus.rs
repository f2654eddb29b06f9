use crate::bits;
use crate::cartridge::Cartridge;
use crate::interrupt::Interrupt;
use crate::joypad::Joypad;
use crate::memory::{Ram, HRAM_SIZE, WRAM_SIZE};
use crate::ppu::Ppu;
use crate::timer::Timer;

/// Receives bytes the program writes to the serial port (0xFF01).
pub trait SerialSink: Send {
    fn send(&mut self, byte: u8);
}

/// Discards serial output. The default when no sink is attached.
#[derive(Default)]
pub struct NullSerialSink;

impl SerialSink for NullSerialSink {
    fn send(&mut self, _byte: u8) {}
}

/// The memory bus: routes CPU reads and writes to RAM regions, the
/// cartridge and the peripherals, and owns all of them.
pub struct Bus {
    pub cartridge: Cartridge,
    pub ppu: Ppu,
    pub timer: Timer,
    pub interrupt: Interrupt,
    pub joypad: Joypad,
    wram: Ram<WRAM_SIZE>,
    hram: Ram<HRAM_SIZE>,
    boot_rom: Option<[u8; 0x100]>,
    /// While set, the boot ROM shadows the first 256 bytes of cartridge
    /// ROM. Reading 0x0100 clears it.
    boot_mode: bool,
    serial: Box<dyn SerialSink>,
}

impl Bus {
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cartridge,
            ppu: Ppu::new(),
            timer: Timer::new(),
            interrupt: Interrupt::new(),
            joypad: Joypad::new(),
            wram: Ram::new(),
            hram: Ram::new(),
            boot_rom: None,
            boot_mode: false,
            serial: Box::new(NullSerialSink),
        }
    }

    /// Map a 256-byte boot ROM over 0x0000-0x00FF until PC reaches 0x0100.
    pub fn load_boot_rom(&mut self, data: [u8; 0x100]) {
        self.boot_rom = Some(data);
        self.boot_mode = true;
    }

    pub fn connect_serial(&mut self, sink: Box<dyn SerialSink>) {
        self.serial = sink;
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => {
                if self.boot_mode && addr < 0x0100 {
                    return self
                        .boot_rom
                        .map(|rom| rom[addr as usize])
                        .unwrap_or(0xFF);
                }
                if addr == 0x0100 && self.boot_mode {
                    self.boot_mode = false;
                    log::debug!("boot ROM unmapped");
                }
                self.cartridge.read(addr)
            }
            0x8000..=0x9FFF => self.ppu.vram.read(addr - 0x8000),
            0xA000..=0xBFFF => self.cartridge.read(addr),
            0xC000..=0xDFFF => self.wram.read(addr - 0xC000),
            // Echo of work RAM.
            0xE000..=0xFDFF => self.wram.read(addr - 0xE000),
            0xFE00..=0xFE9F => self.ppu.oam.read(addr - 0xFE00),
            0xFF00 => self.joypad.read(),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F | 0xFFFF => self.interrupt.read(addr),
            0xFF40..=0xFF7F => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram.read(addr - 0xFF80),
            _ => 0x00,
        }
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cartridge.write(addr, value),
            0x8000..=0x9FFF => self.ppu.vram.write(addr - 0x8000, value),
            0xC000..=0xDFFF => self.wram.write(addr - 0xC000, value),
            0xE000..=0xFDFF => self.wram.write(addr - 0xE000, value),
            0xFE00..=0xFE9F => self.ppu.oam.write(addr - 0xFE00, value),
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write(value),
            0xFF01 => self.serial.send(value),
            0xFF04..=0xFF07 => self.timer.write(addr, value),
            0xFF0F | 0xFFFF => self.interrupt.write(addr, value),
            0xFF40..=0xFF7F => self.ppu.write_reg(addr, value),
            0xFF80..=0xFFFE => self.hram.write(addr - 0xFF80, value),
            _ => log::trace!("unmapped write {addr:#06X} <- {value:#04X}"),
        }
    }

    /// Little-endian 16-bit read.
    pub fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr.wrapping_add(1));
        bits::word(hi, lo)
    }

    /// Little-endian 16-bit write.
    pub fn write_word(&mut self, addr: u16, value: u16) {
        let (hi, lo) = bits::split(value);
        self.write_byte(addr, lo);
        self.write_byte(addr.wrapping_add(1), hi);
    }

    /// Execute a pending OAM DMA transfer: copy 0xA0 bytes from the
    /// requested source page into OAM through the regular decoder.
    pub fn run_oam_dma(&mut self) {
        if let Some(source) = self.ppu.take_dma_request() {
            for i in 0..0xA0u16 {
                let byte = self.read_byte(source.wrapping_add(i));
                self.ppu.oam.write(i, byte);
            }
        }
    }
}
