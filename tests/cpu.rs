mod common;

use common::{boot, boot_image, prg_with_code};

const FLAG_CARRY: u8 = 0x01;
const FLAG_ZERO: u8 = 0x02;
const FLAG_INTERRUPT: u8 = 0x04;
const FLAG_OVERFLOW: u8 = 0x40;
const FLAG_NEGATIVE: u8 = 0x80;

#[test]
fn reset_loads_vector_and_stack() {
    let nes = boot(&[0x4C, 0x00, 0x80]);
    let (_, _, _, p, s, pc) = nes.debug_cpu_regs();
    assert_eq!(pc, 0x8000);
    assert_eq!(s, 0xFD);
    assert_ne!(p & FLAG_INTERRUPT, 0);
}

#[test]
fn reset_vector_of_zero_falls_back_to_8000() {
    let mut prg = vec![0u8; common::PRG_BANK];
    prg[0] = 0xEA;
    // Vectors left zeroed on purpose.
    let nes = boot_image(&prg, &[]);
    let (_, _, _, _, _, pc) = nes.debug_cpu_regs();
    assert_eq!(pc, 0x8000);
}

#[test]
fn lda_sets_zero_and_negative_flags() {
    // LDA #$00 ; LDA #$80
    let mut nes = boot(&[0xA9, 0x00, 0xA9, 0x80]);

    nes.step();
    let (a, _, _, p, _, _) = nes.debug_cpu_regs();
    assert_eq!(a, 0x00);
    assert_ne!(p & FLAG_ZERO, 0);
    assert_eq!(p & FLAG_NEGATIVE, 0);

    nes.step();
    let (a, _, _, p, _, _) = nes.debug_cpu_regs();
    assert_eq!(a, 0x80);
    assert_eq!(p & FLAG_ZERO, 0);
    assert_ne!(p & FLAG_NEGATIVE, 0);
}

#[test]
fn adc_signed_overflow() {
    // LDA #$50 ; ADC #$50 -> $A0 with N and V set, C and Z clear.
    let mut nes = boot(&[0xA9, 0x50, 0x69, 0x50]);
    nes.step();
    nes.step();
    let (a, _, _, p, _, _) = nes.debug_cpu_regs();
    assert_eq!(a, 0xA0);
    assert_ne!(p & FLAG_NEGATIVE, 0);
    assert_ne!(p & FLAG_OVERFLOW, 0);
    assert_eq!(p & FLAG_CARRY, 0);
    assert_eq!(p & FLAG_ZERO, 0);
}

#[test]
fn adc_is_commutative() {
    for (a, b) in [(0x12u8, 0x34u8), (0x7F, 0x01), (0xFF, 0xFF), (0x80, 0x80)] {
        let mut first = boot(&[0xA9, a, 0x69, b]);
        first.step();
        first.step();
        let mut second = boot(&[0xA9, b, 0x69, a]);
        second.step();
        second.step();
        assert_eq!(first.debug_cpu_regs().0, second.debug_cpu_regs().0);
        assert_eq!(first.debug_cpu_regs().3, second.debug_cpu_regs().3);
    }
}

#[test]
fn sbc_subtracts_with_borrow() {
    // SEC ; LDA #$10 ; SBC #$08 -> $08, carry still set.
    let mut nes = boot(&[0x38, 0xA9, 0x10, 0xE9, 0x08]);
    nes.step();
    nes.step();
    nes.step();
    let (a, _, _, p, _, _) = nes.debug_cpu_regs();
    assert_eq!(a, 0x08);
    assert_ne!(p & FLAG_CARRY, 0);
}

#[test]
fn indirect_jmp_page_wrap_bug() {
    // JMP ($02FF): high byte comes from $0200, not $0300.
    let mut nes = boot(&[0x6C, 0xFF, 0x02]);
    nes.bus_write(0x02FF, 0x80);
    nes.bus_write(0x0200, 0x90);
    nes.bus_write(0x0300, 0xAA);
    nes.step();
    let (_, _, _, _, _, pc) = nes.debug_cpu_regs();
    assert_eq!(pc, 0x9080);
}

#[test]
fn absolute_x_page_cross_costs_a_cycle() {
    // LDX #$20 ; LDA $10F0,X (cross) ; LDA $1010,X (no cross)
    let mut nes = boot(&[0xA2, 0x20, 0xBD, 0xF0, 0x10, 0xBD, 0x10, 0x10]);
    assert_eq!(nes.step(), 2);
    assert_eq!(nes.step(), 5);
    assert_eq!(nes.step(), 4);
}

#[test]
fn branch_timing() {
    // LDA #$01 ; BNE +0 (taken, same page) ; LDA #$00 ; BNE +0 (not taken)
    let mut nes = boot(&[0xA9, 0x01, 0xD0, 0x00, 0xA9, 0x00, 0xD0, 0x00]);
    assert_eq!(nes.step(), 2);
    assert_eq!(nes.step(), 3);
    assert_eq!(nes.step(), 2);
    assert_eq!(nes.step(), 2);
}

#[test]
fn brk_and_rti_round_trip() {
    let mut prg = prg_with_code(&[0x00, 0xEA, 0xEA]);
    // IRQ/BRK vector -> $9000, which holds RTI.
    prg[common::PRG_BANK - 2] = 0x00;
    prg[common::PRG_BANK - 1] = 0x90;
    prg[0x1000] = 0x40;
    let mut nes = boot_image(&prg, &[]);

    assert_eq!(nes.step(), 7);
    let (_, _, _, p, _, pc) = nes.debug_cpu_regs();
    assert_eq!(pc, 0x9000);
    assert_ne!(p & FLAG_INTERRUPT, 0);

    nes.step();
    // BRK pushes PC+1, so RTI lands past the padding byte.
    let (_, _, _, _, s, pc) = nes.debug_cpu_regs();
    assert_eq!(pc, 0x8002);
    assert_eq!(s, 0xFD);
}

#[test]
fn stack_push_pull_round_trip() {
    // LDA #$42 ; PHA ; LDA #$00 ; PLA
    let mut nes = boot(&[0xA9, 0x42, 0x48, 0xA9, 0x00, 0x68]);
    for _ in 0..4 {
        nes.step();
    }
    let (a, _, _, p, s, _) = nes.debug_cpu_regs();
    assert_eq!(a, 0x42);
    assert_eq!(s, 0xFD);
    assert_eq!(p & FLAG_ZERO, 0);
}

#[test]
fn compare_sets_carry_and_zero() {
    // LDA #$10 ; CMP #$10
    let mut nes = boot(&[0xA9, 0x10, 0xC9, 0x10]);
    nes.step();
    nes.step();
    let (_, _, _, p, _, _) = nes.debug_cpu_regs();
    assert_ne!(p & FLAG_CARRY, 0);
    assert_ne!(p & FLAG_ZERO, 0);
    assert_eq!(p & FLAG_NEGATIVE, 0);
}

#[test]
fn rmw_inc_writes_back_through_memory() {
    // INC $0010 twice, then LDA $0010.
    let mut nes = boot(&[0xE6, 0x10, 0xE6, 0x10, 0xA5, 0x10]);
    assert_eq!(nes.step(), 5);
    nes.step();
    nes.step();
    assert_eq!(nes.debug_cpu_regs().0, 2);
    assert_eq!(nes.peek(0x0010), 2);
}

#[test]
fn unknown_opcode_degrades_to_two_cycle_nop() {
    let mut nes = boot(&[0xFF, 0xEA]);
    assert_eq!(nes.step(), 2);
    let (count, opcode, pc) = nes.debug_unknown_opcodes();
    assert_eq!(count, 1);
    assert_eq!(opcode, 0xFF);
    assert_eq!(pc, 0x8000);
    assert_eq!(nes.debug_cpu_regs().5, 0x8001);
}

#[test]
fn jsr_rts_round_trip() {
    // JSR $9000 ; NOP at $8003. $9000: LDX #$07 ; RTS.
    let mut prg = prg_with_code(&[0x20, 0x00, 0x90, 0xEA]);
    prg[0x1000] = 0xA2;
    prg[0x1001] = 0x07;
    prg[0x1002] = 0x60;
    let mut nes = boot_image(&prg, &[]);

    assert_eq!(nes.step(), 6);
    assert_eq!(nes.debug_cpu_regs().5, 0x9000);
    nes.step();
    assert_eq!(nes.step(), 6);
    let (_, x, _, _, s, pc) = nes.debug_cpu_regs();
    assert_eq!(x, 0x07);
    assert_eq!(pc, 0x8003);
    assert_eq!(s, 0xFD);
}
