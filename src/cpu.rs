use crate::bits;
use crate::bus::Bus;

// CPU flag bits, F register bits 7..4. The low nibble always reads zero.
const FLAG_Z: u8 = 0x80; // Zero
const FLAG_N: u8 = 0x40; // Subtract
const FLAG_H: u8 = 0x20; // Half carry
const FLAG_C: u8 = 0x10; // Carry

// Post-boot register file when the boot ROM is skipped.
const BOOT_A: u8 = 0x11;
const BOOT_F: u8 = 0x80;
const BOOT_B: u8 = 0x00;
const BOOT_C: u8 = 0x00;
const BOOT_D: u8 = 0xFF;
const BOOT_E: u8 = 0x56;
const BOOT_H: u8 = 0x00;
const BOOT_L: u8 = 0x0D;
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    pub halted: bool,
    pub stopped: bool,
}

impl Cpu {
    /// CPU in the post-boot state, about to execute the cartridge entry
    /// point at 0x0100.
    pub fn new() -> Self {
        Self {
            a: BOOT_A,
            f: BOOT_F,
            b: BOOT_B,
            c: BOOT_C,
            d: BOOT_D,
            e: BOOT_E,
            h: BOOT_H,
            l: BOOT_L,
            pc: BOOT_PC,
            sp: BOOT_SP,
            halted: false,
            stopped: false,
        }
    }

    /// CPU at power-on, for executing a boot ROM mapped at 0x0000. The
    /// boot ROM re-initializes everything it relies on.
    pub fn power_on() -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            pc: 0x0000,
            sp: 0x0000,
            halted: false,
            stopped: false,
        }
    }

    /// Execute one instruction (or service one interrupt) and return its
    /// M-cycle cost.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        if self.halted {
            if bus.interrupt.pending() {
                self.halted = false;
            }
            return 1;
        }
        if let Some(cycles) = self.service_interrupt(bus) {
            return cycles;
        }
        let opcode = self.fetch8(bus);
        if opcode == 0xCB {
            let opcode = self.fetch8(bus);
            self.execute_cb(opcode, bus)
        } else {
            self.execute(opcode, bus)
        }
    }

    /// Dispatch the highest-priority pending interrupt when IME allows:
    /// push PC (high byte first), clear IME, jump to the vector.
    fn service_interrupt(&mut self, bus: &mut Bus) -> Option<u32> {
        if !bus.interrupt.master_enabled() || !bus.interrupt.pending() {
            return None;
        }
        let vector = bus.interrupt.resolve_isr()?;
        self.push16(bus, self.pc);
        self.pc = vector;
        bus.interrupt.disable_master();
        Some(1)
    }

    fn execute(&mut self, opcode: u8, bus: &mut Bus) -> u32 {
        match opcode {
            // NOP
            0x00 => 1,
            0x01 => {
                let value = self.fetch16(bus);
                self.set_bc(value);
                3
            }
            0x02 => {
                bus.write_byte(self.get_bc(), self.a);
                2
            }
            0x03 => {
                self.set_bc(self.get_bc().wrapping_add(1));
                2
            }
            0x04 => {
                self.b = self.inc8(self.b);
                1
            }
            0x05 => {
                self.b = self.dec8(self.b);
                1
            }
            0x06 => {
                self.b = self.fetch8(bus);
                2
            }
            // RLCA; unlike the CB-prefixed rotates, Z is cleared.
            0x07 => {
                let carry = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.f = if carry { FLAG_C } else { 0 };
                1
            }
            0x08 => {
                let addr = self.fetch16(bus);
                bus.write_word(addr, self.sp);
                5
            }
            0x09 => {
                self.add_hl(self.get_bc());
                2
            }
            0x0A => {
                self.a = bus.read_byte(self.get_bc());
                2
            }
            0x0B => {
                self.set_bc(self.get_bc().wrapping_sub(1));
                2
            }
            0x0C => {
                self.c = self.inc8(self.c);
                1
            }
            0x0D => {
                self.c = self.dec8(self.c);
                1
            }
            0x0E => {
                self.c = self.fetch8(bus);
                2
            }
            0x0F => {
                let carry = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.f = if carry { FLAG_C } else { 0 };
                1
            }
            // STOP consumes its pad byte; nothing resumes it in the core.
            0x10 => {
                let _ = self.fetch8(bus);
                self.stopped = true;
                0
            }
            0x11 => {
                let value = self.fetch16(bus);
                self.set_de(value);
                3
            }
            0x12 => {
                bus.write_byte(self.get_de(), self.a);
                2
            }
            0x13 => {
                self.set_de(self.get_de().wrapping_add(1));
                2
            }
            0x14 => {
                self.d = self.inc8(self.d);
                1
            }
            0x15 => {
                self.d = self.dec8(self.d);
                1
            }
            0x16 => {
                self.d = self.fetch8(bus);
                2
            }
            0x17 => {
                let carry = self.a & 0x80 != 0;
                self.a = (self.a << 1) | (self.f & FLAG_C != 0) as u8;
                self.f = if carry { FLAG_C } else { 0 };
                1
            }
            0x18 => {
                let offset = self.fetch8(bus) as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
                3
            }
            0x19 => {
                self.add_hl(self.get_de());
                2
            }
            0x1A => {
                self.a = bus.read_byte(self.get_de());
                2
            }
            0x1B => {
                self.set_de(self.get_de().wrapping_sub(1));
                2
            }
            0x1C => {
                self.e = self.inc8(self.e);
                1
            }
            0x1D => {
                self.e = self.dec8(self.e);
                1
            }
            0x1E => {
                self.e = self.fetch8(bus);
                2
            }
            0x1F => {
                let carry = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | ((self.f & FLAG_C != 0) as u8) << 7;
                self.f = if carry { FLAG_C } else { 0 };
                1
            }
            0x20 => {
                let offset = self.fetch8(bus) as i8;
                if self.f & FLAG_Z == 0 {
                    self.pc = self.pc.wrapping_add(offset as u16);
                }
                2
            }
            0x21 => {
                let value = self.fetch16(bus);
                self.set_hl(value);
                3
            }
            0x22 => {
                let addr = self.get_hl();
                bus.write_byte(addr, self.a);
                self.set_hl(addr.wrapping_add(1));
                2
            }
            0x23 => {
                self.set_hl(self.get_hl().wrapping_add(1));
                2
            }
            0x24 => {
                self.h = self.inc8(self.h);
                1
            }
            0x25 => {
                self.h = self.dec8(self.h);
                1
            }
            0x26 => {
                self.h = self.fetch8(bus);
                2
            }
            0x27 => {
                self.daa();
                1
            }
            0x28 => {
                let offset = self.fetch8(bus) as i8;
                if self.f & FLAG_Z != 0 {
                    self.pc = self.pc.wrapping_add(offset as u16);
                }
                2
            }
            0x29 => {
                self.add_hl(self.get_hl());
                2
            }
            0x2A => {
                let addr = self.get_hl();
                self.a = bus.read_byte(addr);
                self.set_hl(addr.wrapping_add(1));
                2
            }
            0x2B => {
                self.set_hl(self.get_hl().wrapping_sub(1));
                2
            }
            0x2C => {
                self.l = self.inc8(self.l);
                1
            }
            0x2D => {
                self.l = self.dec8(self.l);
                1
            }
            0x2E => {
                self.l = self.fetch8(bus);
                2
            }
            // CPL
            0x2F => {
                self.a = !self.a;
                self.f = (self.f & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H;
                1
            }
            0x30 => {
                let offset = self.fetch8(bus) as i8;
                if self.f & FLAG_C == 0 {
                    self.pc = self.pc.wrapping_add(offset as u16);
                }
                2
            }
            0x31 => {
                self.sp = self.fetch16(bus);
                3
            }
            0x32 => {
                let addr = self.get_hl();
                bus.write_byte(addr, self.a);
                self.set_hl(addr.wrapping_sub(1));
                2
            }
            0x33 => {
                self.sp = self.sp.wrapping_add(1);
                2
            }
            0x34 => {
                let addr = self.get_hl();
                let value = bus.read_byte(addr);
                let result = self.inc8(value);
                bus.write_byte(addr, result);
                3
            }
            0x35 => {
                let addr = self.get_hl();
                let value = bus.read_byte(addr);
                let result = self.dec8(value);
                bus.write_byte(addr, result);
                3
            }
            0x36 => {
                let value = self.fetch8(bus);
                bus.write_byte(self.get_hl(), value);
                3
            }
            // SCF
            0x37 => {
                self.f = (self.f & FLAG_Z) | FLAG_C;
                1
            }
            0x38 => {
                let offset = self.fetch8(bus) as i8;
                if self.f & FLAG_C != 0 {
                    self.pc = self.pc.wrapping_add(offset as u16);
                }
                2
            }
            0x39 => {
                self.add_hl(self.sp);
                2
            }
            0x3A => {
                let addr = self.get_hl();
                self.a = bus.read_byte(addr);
                self.set_hl(addr.wrapping_sub(1));
                2
            }
            0x3B => {
                self.sp = self.sp.wrapping_sub(1);
                2
            }
            0x3C => {
                self.a = self.inc8(self.a);
                1
            }
            0x3D => {
                self.a = self.dec8(self.a);
                1
            }
            0x3E => {
                self.a = self.fetch8(bus);
                2
            }
            // CCF
            0x3F => {
                self.f = (self.f & FLAG_Z) | ((self.f & FLAG_C) ^ FLAG_C);
                1
            }
            0x76 => {
                self.halted = true;
                1
            }
            opcode @ 0x40..=0x7F => {
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                let value = self.read_reg(bus, src);
                self.write_reg(bus, dst, value);
                if src == 6 || dst == 6 {
                    2
                } else {
                    1
                }
            }
            opcode @ 0x80..=0x87 => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.add_a(value);
                self.operand_cycles(opcode)
            }
            opcode @ 0x88..=0x8F => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.adc_a(value);
                self.operand_cycles(opcode)
            }
            opcode @ 0x90..=0x97 => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.sub_a(value);
                self.operand_cycles(opcode)
            }
            opcode @ 0x98..=0x9F => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.sbc_a(value);
                self.operand_cycles(opcode)
            }
            opcode @ 0xA0..=0xA7 => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.and_a(value);
                self.operand_cycles(opcode)
            }
            opcode @ 0xA8..=0xAF => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.xor_a(value);
                self.operand_cycles(opcode)
            }
            opcode @ 0xB0..=0xB7 => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.or_a(value);
                self.operand_cycles(opcode)
            }
            opcode @ 0xB8..=0xBF => {
                let value = self.read_reg(bus, opcode & 0x07);
                self.cp_a(value);
                self.operand_cycles(opcode)
            }
            0xC0 => {
                if self.f & FLAG_Z == 0 {
                    self.pc = self.pop16(bus);
                }
                2
            }
            0xC1 => {
                let value = self.pop16(bus);
                self.set_bc(value);
                3
            }
            0xC2 => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_Z == 0 {
                    self.pc = addr;
                }
                3
            }
            0xC3 => {
                self.pc = self.fetch16(bus);
                4
            }
            0xC4 => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_Z == 0 {
                    self.push16(bus, self.pc);
                    self.pc = addr;
                }
                3
            }
            0xC5 => {
                self.push16(bus, self.get_bc());
                4
            }
            0xC6 => {
                let value = self.fetch8(bus);
                self.add_a(value);
                2
            }
            // RST
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push16(bus, self.pc);
                self.pc = (opcode - 0xC7) as u16;
                4
            }
            0xC8 => {
                if self.f & FLAG_Z != 0 {
                    self.pc = self.pop16(bus);
                }
                2
            }
            0xC9 => {
                self.pc = self.pop16(bus);
                4
            }
            0xCA => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_Z != 0 {
                    self.pc = addr;
                }
                3
            }
            // The CB prefix is decoded in `step`.
            0xCB => unreachable!(),
            0xCC => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_Z != 0 {
                    self.push16(bus, self.pc);
                    self.pc = addr;
                }
                3
            }
            0xCD => {
                let addr = self.fetch16(bus);
                self.push16(bus, self.pc);
                self.pc = addr;
                3
            }
            0xCE => {
                let value = self.fetch8(bus);
                self.adc_a(value);
                2
            }
            0xD0 => {
                if self.f & FLAG_C == 0 {
                    self.pc = self.pop16(bus);
                }
                2
            }
            0xD1 => {
                let value = self.pop16(bus);
                self.set_de(value);
                3
            }
            0xD2 => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_C == 0 {
                    self.pc = addr;
                }
                3
            }
            0xD4 => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_C == 0 {
                    self.push16(bus, self.pc);
                    self.pc = addr;
                }
                3
            }
            0xD5 => {
                self.push16(bus, self.get_de());
                4
            }
            0xD6 => {
                let value = self.fetch8(bus);
                self.sub_a(value);
                2
            }
            0xD8 => {
                if self.f & FLAG_C != 0 {
                    self.pc = self.pop16(bus);
                }
                2
            }
            // RETI re-enables IME on the way out.
            0xD9 => {
                self.pc = self.pop16(bus);
                bus.interrupt.enable_master();
                4
            }
            0xDA => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_C != 0 {
                    self.pc = addr;
                }
                3
            }
            0xDC => {
                let addr = self.fetch16(bus);
                if self.f & FLAG_C != 0 {
                    self.push16(bus, self.pc);
                    self.pc = addr;
                }
                3
            }
            0xDE => {
                let value = self.fetch8(bus);
                self.sbc_a(value);
                2
            }
            0xE0 => {
                let offset = self.fetch8(bus);
                bus.write_byte(0xFF00 | offset as u16, self.a);
                3
            }
            0xE1 => {
                let value = self.pop16(bus);
                self.set_hl(value);
                3
            }
            0xE2 => {
                bus.write_byte(0xFF00 | self.c as u16, self.a);
                2
            }
            0xE5 => {
                self.push16(bus, self.get_hl());
                4
            }
            0xE6 => {
                let value = self.fetch8(bus);
                self.and_a(value);
                2
            }
            0xE8 => {
                let offset = self.fetch8(bus);
                self.sp = self.sp_plus_offset(offset);
                4
            }
            0xE9 => {
                self.pc = self.get_hl();
                1
            }
            0xEA => {
                let addr = self.fetch16(bus);
                bus.write_byte(addr, self.a);
                4
            }
            0xEE => {
                let value = self.fetch8(bus);
                self.xor_a(value);
                2
            }
            0xF0 => {
                let offset = self.fetch8(bus);
                self.a = bus.read_byte(0xFF00 | offset as u16);
                3
            }
            0xF1 => {
                let value = self.pop16(bus);
                self.a = (value >> 8) as u8;
                self.f = value as u8 & 0xF0;
                3
            }
            0xF2 => {
                self.a = bus.read_byte(0xFF00 | self.c as u16);
                2
            }
            // DI
            0xF3 => {
                bus.interrupt.disable_master();
                1
            }
            0xF5 => {
                self.push16(bus, bits::word(self.a, self.f));
                4
            }
            0xF6 => {
                let value = self.fetch8(bus);
                self.or_a(value);
                2
            }
            0xF8 => {
                let offset = self.fetch8(bus);
                let value = self.sp_plus_offset(offset);
                self.set_hl(value);
                3
            }
            0xF9 => {
                self.sp = self.get_hl();
                2
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.a = bus.read_byte(addr);
                4
            }
            // EI
            0xFB => {
                bus.interrupt.enable_master();
                1
            }
            0xFE => {
                let value = self.fetch8(bus);
                self.cp_a(value);
                2
            }
            // Undefined on the LR35902; executed as 1-cycle no-ops.
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                log::warn!(
                    "illegal opcode {opcode:#04X} at {:#06X}",
                    self.pc.wrapping_sub(1)
                );
                1
            }
        }
    }

    fn execute_cb(&mut self, opcode: u8, bus: &mut Bus) -> u32 {
        let reg = opcode & 0x07;
        let rmw_cycles = if reg == 6 { 4 } else { 2 };
        match opcode {
            // RLC
            0x00..=0x07 => {
                let value = self.read_reg(bus, reg);
                let result = self.rlc8(value);
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // RRC
            0x08..=0x0F => {
                let value = self.read_reg(bus, reg);
                let result = self.rrc8(value);
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // RL
            0x10..=0x17 => {
                let value = self.read_reg(bus, reg);
                let result = self.rl8(value);
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // RR
            0x18..=0x1F => {
                let value = self.read_reg(bus, reg);
                let result = self.rr8(value);
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // SLA
            0x20..=0x27 => {
                let value = self.read_reg(bus, reg);
                let result = self.shift_left(value);
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // SRA keeps the sign bit.
            0x28..=0x2F => {
                let value = self.read_reg(bus, reg);
                let result = self.shift_right(value, value & 0x80);
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // SWAP
            0x30..=0x37 => {
                let value = self.read_reg(bus, reg);
                let result = value.rotate_left(4);
                self.f = if result == 0 { FLAG_Z } else { 0 };
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // SRL
            0x38..=0x3F => {
                let value = self.read_reg(bus, reg);
                let result = self.shift_right(value, 0);
                self.write_reg(bus, reg, result);
                rmw_cycles
            }
            // BIT b,r: Z from the inverted bit, C untouched.
            0x40..=0x7F => {
                let bit = (opcode - 0x40) >> 3;
                let value = self.read_reg(bus, reg);
                self.f = (self.f & FLAG_C)
                    | FLAG_H
                    | if value & (1 << bit) == 0 { FLAG_Z } else { 0 };
                if reg == 6 {
                    3
                } else {
                    2
                }
            }
            // RES b,r
            0x80..=0xBF => {
                let bit = (opcode - 0x80) >> 3;
                let value = self.read_reg(bus, reg);
                self.write_reg(bus, reg, value & !(1 << bit));
                rmw_cycles
            }
            // SET b,r
            0xC0..=0xFF => {
                let bit = (opcode - 0xC0) >> 3;
                let value = self.read_reg(bus, reg);
                self.write_reg(bus, reg, value | (1 << bit));
                rmw_cycles
            }
        }
    }

    // ---- operand plumbing ----

    #[inline]
    fn fetch8(&mut self, bus: &mut Bus) -> u8 {
        let value = bus.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    #[inline]
    fn fetch16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch8(bus);
        let hi = self.fetch8(bus);
        bits::word(hi, lo)
    }

    fn push16(&mut self, bus: &mut Bus, value: u16) {
        let (hi, lo) = bits::split(value);
        self.sp = self.sp.wrapping_sub(1);
        bus.write_byte(self.sp, hi);
        self.sp = self.sp.wrapping_sub(1);
        bus.write_byte(self.sp, lo);
    }

    fn pop16(&mut self, bus: &mut Bus) -> u16 {
        let lo = bus.read_byte(self.sp);
        self.sp = self.sp.wrapping_add(1);
        let hi = bus.read_byte(self.sp);
        self.sp = self.sp.wrapping_add(1);
        bits::word(hi, lo)
    }

    /// Operand decode shared by the LD/ALU blocks: 0..=5 are B,C,D,E,H,L;
    /// 6 is (HL); 7 is A.
    fn read_reg(&mut self, bus: &mut Bus, index: u8) -> u8 {
        match index {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => bus.read_byte(self.get_hl()),
            7 => self.a,
            _ => unreachable!(),
        }
    }

    fn write_reg(&mut self, bus: &mut Bus, index: u8, value: u8) {
        match index {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => bus.write_byte(self.get_hl(), value),
            7 => self.a = value,
            _ => unreachable!(),
        }
    }

    fn operand_cycles(&self, opcode: u8) -> u32 {
        if opcode & 0x07 == 6 {
            2
        } else {
            1
        }
    }

    // ---- register pairs ----

    pub fn get_bc(&self) -> u16 {
        bits::word(self.b, self.c)
    }

    pub fn set_bc(&mut self, value: u16) {
        (self.b, self.c) = bits::split(value);
    }

    pub fn get_de(&self) -> u16 {
        bits::word(self.d, self.e)
    }

    pub fn set_de(&mut self, value: u16) {
        (self.d, self.e) = bits::split(value);
    }

    pub fn get_hl(&self) -> u16 {
        bits::word(self.h, self.l)
    }

    pub fn set_hl(&mut self, value: u16) {
        (self.h, self.l) = bits::split(value);
    }

    // ---- arithmetic and flags ----

    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.f = (self.f & FLAG_C)
            | if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x0F == 0x0F { FLAG_H } else { 0 };
        result
    }

    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.f = (self.f & FLAG_C)
            | FLAG_N
            | if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x0F == 0 { FLAG_H } else { 0 };
        result
    }

    fn add_a(&mut self, value: u8) {
        let (result, carry) = self.a.overflowing_add(value);
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if (self.a & 0x0F) + (value & 0x0F) > 0x0F {
                FLAG_H
            } else {
                0
            }
            | if carry { FLAG_C } else { 0 };
        self.a = result;
    }

    fn adc_a(&mut self, value: u8) {
        let carry_in = (self.f & FLAG_C != 0) as u8;
        let result = self.a.wrapping_add(value).wrapping_add(carry_in);
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if (self.a & 0x0F) + (value & 0x0F) + carry_in > 0x0F {
                FLAG_H
            } else {
                0
            }
            | if self.a as u16 + value as u16 + carry_in as u16 > 0xFF {
                FLAG_C
            } else {
                0
            };
        self.a = result;
    }

    fn sub_a(&mut self, value: u8) {
        self.cp_a(value);
        self.a = self.a.wrapping_sub(value);
    }

    fn sbc_a(&mut self, value: u8) {
        let carry_in = (self.f & FLAG_C != 0) as u8;
        let result = self.a.wrapping_sub(value).wrapping_sub(carry_in);
        self.f = FLAG_N
            | if result == 0 { FLAG_Z } else { 0 }
            | if (self.a & 0x0F) < (value & 0x0F) + carry_in {
                FLAG_H
            } else {
                0
            }
            | if (self.a as u16) < value as u16 + carry_in as u16 {
                FLAG_C
            } else {
                0
            };
        self.a = result;
    }

    fn and_a(&mut self, value: u8) {
        self.a &= value;
        self.f = if self.a == 0 { FLAG_Z } else { 0 } | FLAG_H;
    }

    fn xor_a(&mut self, value: u8) {
        self.a ^= value;
        self.f = if self.a == 0 { FLAG_Z } else { 0 };
    }

    fn or_a(&mut self, value: u8) {
        self.a |= value;
        self.f = if self.a == 0 { FLAG_Z } else { 0 };
    }

    /// CP: subtraction flags with the result discarded.
    fn cp_a(&mut self, value: u8) {
        self.f = FLAG_N
            | if self.a == value { FLAG_Z } else { 0 }
            | if self.a & 0x0F < value & 0x0F { FLAG_H } else { 0 }
            | if self.a < value { FLAG_C } else { 0 };
    }

    /// ADD HL,rr: Z untouched, H from bit 11, C from bit 15.
    fn add_hl(&mut self, value: u16) {
        let hl = self.get_hl();
        let result = hl.wrapping_add(value);
        self.f = (self.f & FLAG_Z)
            | if (result ^ value ^ hl) & 0x1000 != 0 {
                FLAG_H
            } else {
                0
            }
            | if hl as u32 + value as u32 > 0xFFFF {
                FLAG_C
            } else {
                0
            };
        self.set_hl(result);
    }

    /// SP + signed immediate for ADD SP,s8 and LD HL,SP+s8: Z and N
    /// cleared, H and C from unsigned arithmetic on the low byte.
    fn sp_plus_offset(&mut self, offset: u8) -> u16 {
        let sp = self.sp;
        let check = sp ^ offset as u16 ^ sp.wrapping_add(offset as u16);
        self.f = if check & 0x10 != 0 { FLAG_H } else { 0 }
            | if check & 0x100 != 0 { FLAG_C } else { 0 };
        sp.wrapping_add(offset as i8 as i16 as u16)
    }

    /// BCD adjust after an addition or subtraction.
    fn daa(&mut self) {
        let mut a = self.a as u16;
        if self.f & FLAG_N == 0 {
            if self.f & FLAG_H != 0 || a & 0x0F > 0x09 {
                a += 0x06;
            }
            if self.f & FLAG_C != 0 || a > 0x9F {
                a += 0x60;
            }
        } else {
            if self.f & FLAG_H != 0 {
                a = a.wrapping_sub(0x06) & 0xFF;
            }
            if self.f & FLAG_C != 0 {
                a = a.wrapping_sub(0x60);
            }
        }
        self.f &= !(FLAG_H | FLAG_Z);
        if a & 0x100 != 0 {
            self.f |= FLAG_C;
        }
        self.a = (a & 0xFF) as u8;
        if self.a == 0 {
            self.f |= FLAG_Z;
        }
    }

    // ---- CB rotate/shift primitives; Z comes from the result ----

    fn rlc8(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(1);
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x80 != 0 { FLAG_C } else { 0 };
        result
    }

    fn rrc8(&mut self, value: u8) -> u8 {
        let result = value.rotate_right(1);
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x01 != 0 { FLAG_C } else { 0 };
        result
    }

    fn rl8(&mut self, value: u8) -> u8 {
        let result = (value << 1) | (self.f & FLAG_C != 0) as u8;
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x80 != 0 { FLAG_C } else { 0 };
        result
    }

    fn rr8(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | ((self.f & FLAG_C != 0) as u8) << 7;
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x01 != 0 { FLAG_C } else { 0 };
        result
    }

    fn shift_left(&mut self, value: u8) -> u8 {
        let result = value << 1;
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x80 != 0 { FLAG_C } else { 0 };
        result
    }

    fn shift_right(&mut self, value: u8, msb: u8) -> u8 {
        let result = (value >> 1) | msb;
        self.f = if result == 0 { FLAG_Z } else { 0 }
            | if value & 0x01 != 0 { FLAG_C } else { 0 };
        result
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;

    fn bus_with(code: &[u8]) -> Bus {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0100..0x0100 + code.len()].copy_from_slice(code);
        Bus::new(Cartridge::new(rom).unwrap())
    }

    fn flags(cpu: &Cpu) -> (bool, bool, bool, bool) {
        (
            cpu.f & FLAG_Z != 0,
            cpu.f & FLAG_N != 0,
            cpu.f & FLAG_H != 0,
            cpu.f & FLAG_C != 0,
        )
    }

    #[test]
    fn flag_low_nibble_stays_zero_through_pop_af() {
        let mut bus = bus_with(&[0xF1]); // POP AF
        let mut cpu = Cpu::new();
        cpu.sp = 0xC000;
        bus.write_word(0xC000, 0x12FF);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x12);
        assert_eq!(cpu.f, 0xF0);
    }

    #[test]
    fn inc_half_carry_leaves_carry_alone() {
        let mut bus = bus_with(&[0x3C]); // INC A
        let mut cpu = Cpu::new();
        cpu.a = 0x0F;
        cpu.f = FLAG_C;
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x10);
        assert_eq!(flags(&cpu), (false, false, true, true));
    }

    #[test]
    fn dec_wraps_and_sets_half_borrow() {
        let mut bus = bus_with(&[0x3D]); // DEC A
        let mut cpu = Cpu::new();
        cpu.a = 0x00;
        cpu.f = 0;
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0xFF);
        assert_eq!(flags(&cpu), (false, true, true, false));
    }

    #[test]
    fn adc_includes_carry_in_both_carries() {
        let mut bus = bus_with(&[0xCE, 0x0F]); // ADC A,0x0F
        let mut cpu = Cpu::new();
        cpu.a = 0xF0;
        cpu.f = FLAG_C;
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x00);
        assert_eq!(flags(&cpu), (true, false, true, true));
    }

    #[test]
    fn sbc_borrows_through_carry() {
        let mut bus = bus_with(&[0xDE, 0x01]); // SBC A,1
        let mut cpu = Cpu::new();
        cpu.a = 0x01;
        cpu.f = FLAG_C;
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0xFF);
        assert_eq!(flags(&cpu), (false, true, true, true));
    }

    #[test]
    fn add_hl_preserves_zero_flag() {
        let mut bus = bus_with(&[0x09]); // ADD HL,BC
        let mut cpu = Cpu::new();
        cpu.f = FLAG_Z;
        cpu.set_hl(0x0FFF);
        cpu.set_bc(0x0001);
        cpu.step(&mut bus);
        assert_eq!(cpu.get_hl(), 0x1000);
        assert_eq!(flags(&cpu), (true, false, true, false));
    }

    #[test]
    fn daa_after_bcd_addition() {
        let mut bus = bus_with(&[0xC6, 0x19, 0x27]); // ADD A,0x19; DAA
        let mut cpu = Cpu::new();
        cpu.a = 0x28;
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x47); // 28 + 19 = 47 in BCD
        assert_eq!(flags(&cpu), (false, false, false, false));
    }

    #[test]
    fn rst_pushes_return_address_and_vectors() {
        let mut bus = bus_with(&[0xEF]); // RST 0x28
        let mut cpu = Cpu::new();
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 4);
        assert_eq!(cpu.pc, 0x0028);
        assert_eq!(cpu.sp, BOOT_SP - 2);
        assert_eq!(bus.read_word(cpu.sp), 0x0101);
    }

    #[test]
    fn bit_test_sets_half_and_keeps_carry() {
        let mut bus = bus_with(&[0xCB, 0x7C]); // BIT 7,H
        let mut cpu = Cpu::new();
        cpu.h = 0x7F;
        cpu.f = FLAG_C;
        cpu.step(&mut bus);
        assert_eq!(flags(&cpu), (true, false, true, true));
    }

    #[test]
    fn halt_wakes_on_pending_interrupt_without_ime() {
        let mut bus = bus_with(&[0x76]);
        let mut cpu = Cpu::new();
        cpu.step(&mut bus);
        assert!(cpu.halted);
        assert_eq!(cpu.step(&mut bus), 1);
        assert!(cpu.halted);

        bus.interrupt.enable = 0x01;
        bus.interrupt.request(crate::interrupt::VBLANK);
        cpu.step(&mut bus);
        assert!(!cpu.halted);
    }

    #[test]
    fn interrupt_service_pushes_pc_and_clears_ime() {
        let mut bus = bus_with(&[0x00]);
        let mut cpu = Cpu::new();
        bus.interrupt.enable_master();
        bus.interrupt.enable = 0x04;
        bus.interrupt.request(crate::interrupt::TIMER);

        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 1);
        assert_eq!(cpu.pc, 0x0050);
        assert!(!bus.interrupt.master_enabled());
        assert_eq!(bus.read_word(cpu.sp), 0x0100);
        assert_eq!(bus.interrupt.flags & crate::interrupt::TIMER, 0);
    }

    #[test]
    fn illegal_opcode_is_a_one_cycle_nop() {
        let mut bus = bus_with(&[0xD3, 0x00]);
        let mut cpu = Cpu::new();
        assert_eq!(cpu.step(&mut bus), 1);
        assert_eq!(cpu.pc, 0x0101);
    }

    #[test]
    fn stop_consumes_its_pad_byte() {
        let mut bus = bus_with(&[0x10, 0x00, 0x04]); // STOP; INC B
        let mut cpu = Cpu::new();
        assert_eq!(cpu.step(&mut bus), 0);
        assert!(cpu.stopped);
        assert_eq!(cpu.pc, 0x0102);
    }
}
