mod common;

use common::gameboy_with;
use dotmatrix_core::gameboy::CYCLES_PER_FRAME;
use dotmatrix_core::interrupt;
use dotmatrix_core::ppu::{FRAME_BYTES, SCREEN_WIDTH};

#[test]
fn one_frame_covers_exactly_154_scanlines() {
    let mut gb = gameboy_with(&[0x76]);
    assert_eq!(CYCLES_PER_FRAME, 154 * 456);

    gb.next_frame();
    assert_eq!(gb.bus.read_byte(0xFF44), 154);

    // The next frame wraps LY through zero and keeps counting.
    gb.next_frame();
    assert_eq!(gb.bus.read_byte(0xFF44), 154);
}

#[test]
fn vblank_interrupt_is_raised_every_frame() {
    let mut gb = gameboy_with(&[0x76]);
    gb.next_frame();
    assert_ne!(gb.bus.interrupt.flags & interrupt::VBLANK, 0);

    gb.bus.interrupt.flags = 0;
    gb.next_frame();
    assert_ne!(gb.bus.interrupt.flags & interrupt::VBLANK, 0);
}

#[test]
fn framebuffer_is_full_rgba_with_opaque_alpha() {
    let mut gb = gameboy_with(&[0x76]);
    let frame = gb.next_frame();
    assert_eq!(frame.len(), FRAME_BYTES);
    // Every rendered pixel carries alpha 255.
    assert!(frame.chunks_exact(4).all(|px| px[3] == 0xFF));
}

#[test]
fn program_drawn_tile_shows_up_in_the_frame() {
    // LD A,0xFF; LD (0x8000),A; LD (0x8001),A  -- tile 0 row 0 = color 3
    // LD A,0xE4; LDH (0x47),A                  -- identity palette
    // HALT
    let mut gb = gameboy_with(&[
        0x3E, 0xFF, 0xEA, 0x00, 0x80, 0xEA, 0x01, 0x80, 0x3E, 0xE4, 0xE0, 0x47, 0x76,
    ]);
    let frame = gb.next_frame();
    assert_eq!(&frame[0..4], &[0, 40, 0, 255]);
    assert_eq!(&frame[7 * 4..8 * 4], &[0, 40, 0, 255]);
}

#[test]
fn window_overlays_background_when_enabled() {
    let mut gb = gameboy_with(&[0x76]);
    // Window tilemap at 0x9C00 points at tile 1, a solid color-3 tile.
    for row in 0..8u16 {
        gb.bus.write_byte(0x8010 + row * 2, 0xFF);
        gb.bus.write_byte(0x8011 + row * 2, 0xFF);
    }
    for entry in 0..0x400u16 {
        gb.bus.write_byte(0x9C00 + entry, 0x01);
    }
    // LCD on, BG data 0x8000, window on with map 1; WX=7 puts the window
    // at the left edge, WY=0 at the top.
    gb.bus.write_byte(0xFF40, 0xF1);
    gb.bus.write_byte(0xFF4B, 0x07);
    gb.bus.write_byte(0xFF4A, 0x00);
    gb.bus.write_byte(0xFF47, 0b1110_0100);

    let frame = gb.next_frame();
    assert_eq!(&frame[0..4], &[0, 40, 0, 255]);
    let last = (SCREEN_WIDTH - 1) * 4;
    assert_eq!(&frame[last..last + 4], &[0, 40, 0, 255]);
}

#[test]
fn window_honors_its_start_line() {
    let mut gb = gameboy_with(&[0x76]);
    for row in 0..8u16 {
        gb.bus.write_byte(0x8010 + row * 2, 0xFF);
        gb.bus.write_byte(0x8011 + row * 2, 0xFF);
    }
    for entry in 0..0x400u16 {
        gb.bus.write_byte(0x9C00 + entry, 0x01);
    }
    gb.bus.write_byte(0xFF40, 0xF1);
    gb.bus.write_byte(0xFF4B, 0x07);
    gb.bus.write_byte(0xFF4A, 100); // WY
    gb.bus.write_byte(0xFF47, 0b1110_0100);

    let frame = gb.next_frame();
    // Above WY the background (blank, color 0) shows.
    let above = 99 * SCREEN_WIDTH * 4;
    assert_eq!(&frame[above..above + 4], &[175, 197, 160, 255]);
    let below = 100 * SCREEN_WIDTH * 4;
    assert_eq!(&frame[below..below + 4], &[0, 40, 0, 255]);
}

#[test]
fn oam_dma_runs_atomically_between_instructions() {
    // LD A,0xC1; LDH (0x46),A; INC B; HALT
    let mut gb = gameboy_with(&[0x3E, 0xC1, 0xE0, 0x46, 0x04, 0x76]);
    for i in 0..0xA0u16 {
        gb.bus.write_byte(0xC100 + i, i as u8);
    }

    gb.cpu.step(&mut gb.bus); // LD A
    gb.cpu.step(&mut gb.bus); // LDH (0x46),A
    assert!(gb.bus.ppu.dma_pending());
    assert_eq!(gb.cpu.b, 0); // next instruction has not run

    // The driver performs the transfer instead of stepping the CPU.
    let pc = gb.cpu.pc;
    gb.bus.run_oam_dma();
    assert_eq!(gb.cpu.pc, pc);
    assert_eq!(gb.bus.ppu.oam.read(0x00), 0x00);
    assert_eq!(gb.bus.ppu.oam.read(0x9F), 0x9F);

    gb.cpu.step(&mut gb.bus);
    assert_eq!(gb.cpu.b, 1);
}

#[test]
fn oam_dma_through_the_frame_loop() {
    let mut gb = gameboy_with(&[0x3E, 0xC1, 0xE0, 0x46, 0x76]);
    for i in 0..0xA0u16 {
        gb.bus.write_byte(0xC100 + i, 0xA0 - i as u8);
    }

    gb.next_frame();
    assert!(!gb.bus.ppu.dma_pending());
    assert_eq!(gb.bus.read_byte(0xFE00), 0xA0);
    assert_eq!(gb.bus.read_byte(0xFE9F), 0x01);
    assert!(gb.cpu.halted);
}

#[test]
fn lcd_off_stops_ly_for_the_whole_frame() {
    // LD A,0x11; LDH (0x40),A; HALT -- clears LCDC bit 7
    let mut gb = gameboy_with(&[0x3E, 0x11, 0xE0, 0x40, 0x76]);
    gb.next_frame();
    assert_eq!(gb.bus.read_byte(0xFF44), 0);
    assert_eq!(gb.bus.interrupt.flags & interrupt::VBLANK, 0);
}
