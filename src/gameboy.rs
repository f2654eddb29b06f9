use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::interrupt;
use crate::joypad::{Button, Joypad};

/// T-cycles per frame (~59.73 Hz at 4.194304 MHz).
pub const CYCLES_PER_FRAME: u32 = 70224;

/// M-cycles charged for an OAM DMA transfer while no instruction runs.
const OAM_DMA_CYCLES: u32 = 162;

/// Host side of the core: receives finished frames and supplies input.
///
/// The driver never paces real time itself. The frontend owns the tick
/// source (a 16 ms timer, vsync, ...) and calls [`GameBoy::run_frame`]
/// from its own loop.
pub trait Frontend {
    /// Receives the finished 160x144 RGBA framebuffer, top-left origin.
    fn render(&mut self, frame: &[u8]);

    /// Called once per frame boundary to update button state.
    fn poll_input(&mut self, joypad: &mut Joypad);
}

/// The assembled machine: CPU plus bus, advanced one frame at a time.
pub struct GameBoy {
    pub cpu: Cpu,
    pub bus: Bus,
    current_cycle: u32,
}

impl GameBoy {
    /// Machine in the post-boot state, entering the cartridge at 0x0100.
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(cartridge),
            current_cycle: 0,
        }
    }

    /// Machine at power-on with a boot ROM mapped over 0x0000-0x00FF;
    /// execution starts at 0x0000 and the boot ROM unmaps itself when PC
    /// reaches 0x0100.
    pub fn with_boot_rom(cartridge: Cartridge, boot_rom: [u8; 0x100]) -> Self {
        let mut bus = Bus::new(cartridge);
        bus.load_boot_rom(boot_rom);
        Self {
            cpu: Cpu::power_on(),
            bus,
            current_cycle: 0,
        }
    }

    /// Advance the machine by one frame's budget of T-cycles and return
    /// the framebuffer.
    ///
    /// Each iteration either runs one CPU instruction or, when an OAM DMA
    /// is pending, performs the whole transfer atomically; the PPU then
    /// advances by four T-cycles per M-cycle and the timer by the same
    /// M-cycle count, raising its interrupt on overflow.
    pub fn next_frame(&mut self) -> &[u8] {
        loop {
            let cycles = if self.bus.ppu.dma_pending() {
                self.bus.run_oam_dma();
                OAM_DMA_CYCLES
            } else {
                self.cpu.step(&mut self.bus)
            };

            let t_cycles = cycles * 4;
            let bus = &mut self.bus;
            bus.ppu.step(t_cycles, &mut bus.interrupt);
            if bus.timer.update(cycles) {
                bus.interrupt.request(interrupt::TIMER);
            }

            self.current_cycle += t_cycles;
            if self.current_cycle >= CYCLES_PER_FRAME {
                self.current_cycle -= CYCLES_PER_FRAME;
                return self.bus.ppu.frame();
            }
        }
    }

    /// Produce one frame and exchange it with the frontend: input is
    /// polled at the frame boundary, then the framebuffer is handed over.
    pub fn run_frame(&mut self, frontend: &mut dyn Frontend) {
        self.next_frame();
        frontend.poll_input(&mut self.bus.joypad);
        self.drain_joypad_irq();
        frontend.render(self.bus.ppu.frame());
    }

    /// Press a button outside the `run_frame` input path.
    pub fn press(&mut self, button: Button) {
        self.bus.joypad.press(button);
        self.drain_joypad_irq();
    }

    pub fn release(&mut self, button: Button) {
        self.bus.joypad.release(button);
    }

    fn drain_joypad_irq(&mut self) {
        if self.bus.joypad.take_irq() {
            self.bus.interrupt.request(interrupt::JOYPAD);
        }
    }
}
