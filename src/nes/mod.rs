pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
mod palette;
pub mod ppu;

use std::path::Path;

use apu::Apu;
pub use cartridge::{Cartridge, CartridgeError, Mirroring};
pub use controller::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP, Controller,
};
use cpu::{Cpu, FLAG_INTERRUPT};
use ppu::Ppu;
pub use ppu::{FRAME_HEIGHT, FRAME_WIDTH};

/// NTSC frame budget in CPU cycles.
pub const CPU_CYCLES_PER_FRAME: u32 = 29_830;

/// The console: owns every component and time-multiplexes them. One CPU
/// instruction runs to completion, then the PPU advances three dots per
/// CPU cycle and the APU one cycle per CPU cycle.
pub struct Nes {
    pub(crate) cpu: Cpu,
    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) cart: Option<Cartridge>,
    pub(crate) controller1: Controller,
    pub(crate) controller2: Controller,
    pub(crate) ram: [u8; 2048],
    pub(crate) dma_stall: u32,
    pub(crate) unknown_opcode_count: u64,
    pub(crate) last_unknown_opcode: u8,
    pub(crate) last_unknown_pc: u16,
}

impl Nes {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            cart: None,
            controller1: Controller::new(),
            controller2: Controller::new(),
            ram: [0; 2048],
            dma_stall: 0,
            unknown_opcode_count: 0,
            last_unknown_opcode: 0,
            last_unknown_pc: 0,
        }
    }

    pub fn load_rom_from_path(&mut self, path: &Path) -> Result<(), CartridgeError> {
        let cart = Cartridge::from_file(path)?;
        self.insert_cartridge(cart);
        Ok(())
    }

    pub fn load_rom_from_bytes(&mut self, bytes: &[u8]) -> Result<(), CartridgeError> {
        let cart = Cartridge::from_bytes(bytes)?;
        self.insert_cartridge(cart);
        Ok(())
    }

    pub fn insert_cartridge(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
        self.reset();
    }

    pub fn has_rom(&self) -> bool {
        self.cart.is_some()
    }

    pub fn mirroring(&self) -> Option<Mirroring> {
        self.cart.as_ref().map(|cart| cart.mirroring)
    }

    /// Power-on/reset sequencing: components first, then the CPU reads the
    /// reset vector through the freshly wired bus.
    pub fn reset(&mut self) {
        if self.cart.is_none() {
            return;
        }
        self.cpu = Cpu::new();
        self.dma_stall = 0;
        self.unknown_opcode_count = 0;
        self.last_unknown_opcode = 0;
        self.last_unknown_pc = 0;
        self.ppu.reset();
        self.apu.reset();
        self.reset_cpu();
    }

    /// One CPU instruction plus the PPU/APU time it bought. Returns the
    /// CPU cycles consumed.
    pub fn step(&mut self) -> u32 {
        let cycles = self.step_cpu();

        for _ in 0..cycles * 3 {
            if let Some(cart) = self.cart.as_ref() {
                self.ppu.tick(cart);
            }
        }
        if self.ppu.take_nmi() {
            self.cpu.nmi_line = true;
        }

        for _ in 0..cycles {
            self.apu.tick();
        }
        if let Some(addr) = self.apu.take_dmc_dma_request() {
            let value = self.cpu_read(addr);
            self.apu.complete_dmc_dma(value);
        }
        if self.apu.irq_pending() && !self.get_flag(FLAG_INTERRUPT) {
            self.cpu.irq_line = true;
        }

        cycles
    }

    /// Run at least `budget` CPU cycles.
    pub fn run_cycles(&mut self, budget: u32) {
        if self.cart.is_none() {
            return;
        }
        let mut remaining = budget as i64;
        while remaining > 0 {
            remaining -= self.step() as i64;
        }
    }

    /// Run until the PPU marks the frame buffer ready (the wrap from the
    /// pre-render line back to scanline 0).
    pub fn run_frame(&mut self) {
        if self.cart.is_none() {
            return;
        }
        self.ppu.clear_frame_ready();
        let mut guard = 0u32;
        while !self.ppu.frame_ready() {
            self.step();
            guard += 1;
            if guard > 1_000_000 {
                break;
            }
        }
    }

    pub fn set_controller_states(&mut self, pad1: u8, pad2: u8) {
        self.controller1.set_state(pad1);
        self.controller2.set_state(pad2);
    }

    /// 256x240 ARGB, row-major, indexed `y * 256 + x`.
    pub fn frame_buffer(&self) -> &[u32] {
        self.ppu.frame_buffer()
    }

    /// Re-render the frame buffer with the PPU's whole-frame fallback path.
    pub fn render_fallback_frame(&mut self) {
        if let Some(cart) = self.cart.as_ref() {
            self.ppu.render_frame(cart);
        }
    }

    pub fn set_audio_sample_rate(&mut self, sample_rate: u32) {
        self.apu.set_sample_rate(sample_rate);
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.apu.sample_rate()
    }

    pub fn take_audio_samples(&mut self) -> Vec<f32> {
        self.apu.take_samples()
    }

    // Debug surface for the CLI trace flags and the GUI panel.

    pub fn debug_cpu_regs(&self) -> (u8, u8, u8, u8, u8, u16) {
        (
            self.cpu.a,
            self.cpu.x,
            self.cpu.y,
            self.cpu.p,
            self.cpu.s,
            self.cpu.pc,
        )
    }

    pub fn debug_total_cycles(&self) -> u64 {
        self.cpu.cycles
    }

    pub fn debug_ppu_scanline_dot(&self) -> (u16, u16) {
        self.ppu.scanline_dot()
    }

    pub fn debug_ppu_loopy(&self) -> (u16, u16, u8, bool) {
        self.ppu.loopy_state()
    }

    pub fn debug_unknown_opcodes(&self) -> (u64, u8, u16) {
        (
            self.unknown_opcode_count,
            self.last_unknown_opcode,
            self.last_unknown_pc,
        )
    }
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}
