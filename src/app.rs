use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use eframe::egui::{self, ColorImage, Key, TextureHandle, TextureOptions};

use crate::audio::AudioOutput;
use crate::nes::{FRAME_HEIGHT, FRAME_WIDTH, Nes};

const MAX_FRAMES_PER_UPDATE: u32 = 2;

/// Keyboard-to-controller mapping, one key per button in bit order
/// A, B, Select, Start, Up, Down, Left, Right.
#[derive(Debug, Clone, Copy)]
pub struct KeyMap {
    keys: [Key; 8],
}

impl KeyMap {
    pub fn player_one_default() -> Self {
        Self {
            keys: [
                Key::Z,
                Key::X,
                Key::C,
                Key::Enter,
                Key::ArrowUp,
                Key::ArrowDown,
                Key::ArrowLeft,
                Key::ArrowRight,
            ],
        }
    }

    pub fn player_two_default() -> Self {
        Self {
            keys: [Key::G, Key::H, Key::T, Key::Y, Key::I, Key::K, Key::J, Key::L],
        }
    }

    /// Parse a CSV of eight key names, e.g. `Z,X,C,Enter,Up,Down,Left,Right`.
    pub fn parse(csv: &str) -> Result<Self> {
        let names: Vec<&str> = csv.split(',').map(str::trim).collect();
        if names.len() != 8 {
            return Err(anyhow!(
                "key map needs exactly 8 comma-separated names, got {}",
                names.len()
            ));
        }
        let mut keys = [Key::Z; 8];
        for (slot, name) in keys.iter_mut().zip(&names) {
            *slot = parse_key(name).ok_or_else(|| anyhow!("unknown key name: {name}"))?;
        }
        Ok(Self { keys })
    }

    fn state(&self, input: &egui::InputState) -> u8 {
        let mut state = 0u8;
        for (bit, key) in self.keys.iter().enumerate() {
            if input.key_down(*key) {
                state |= 1 << bit;
            }
        }
        state
    }
}

fn parse_key(name: &str) -> Option<Key> {
    let key = match name.to_ascii_lowercase().as_str() {
        "up" | "arrowup" => Key::ArrowUp,
        "down" | "arrowdown" => Key::ArrowDown,
        "left" | "arrowleft" => Key::ArrowLeft,
        "right" | "arrowright" => Key::ArrowRight,
        "enter" | "return" => Key::Enter,
        "space" => Key::Space,
        "tab" => Key::Tab,
        "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "a" => Key::A,
        "b" => Key::B,
        "c" => Key::C,
        "d" => Key::D,
        "e" => Key::E,
        "f" => Key::F,
        "g" => Key::G,
        "h" => Key::H,
        "i" => Key::I,
        "j" => Key::J,
        "k" => Key::K,
        "l" => Key::L,
        "m" => Key::M,
        "n" => Key::N,
        "o" => Key::O,
        "p" => Key::P,
        "q" => Key::Q,
        "r" => Key::R,
        "s" => Key::S,
        "t" => Key::T,
        "u" => Key::U,
        "v" => Key::V,
        "w" => Key::W,
        "x" => Key::X,
        "y" => Key::Y,
        "z" => Key::Z,
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,
        _ => return None,
    };
    Some(key)
}

pub struct AppOptions {
    pub keymap1: KeyMap,
    pub keymap2: KeyMap,
    pub fps: u32,
    pub no_audio: bool,
    pub debug_ppu: bool,
    pub bg_fallback: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            keymap1: KeyMap::player_one_default(),
            keymap2: KeyMap::player_two_default(),
            fps: 60,
            no_audio: false,
            debug_ppu: false,
            bg_fallback: false,
        }
    }
}

pub struct NesApp {
    nes: Nes,
    options: AppOptions,
    frame_texture: Option<TextureHandle>,
    status_line: String,
    loaded_rom: Option<PathBuf>,
    audio: Option<AudioOutput>,
    frame_interval: Duration,
    next_frame_at: Option<Instant>,
    paused: bool,
}

impl NesApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        nes: Nes,
        rom: Option<PathBuf>,
        options: AppOptions,
    ) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let mut nes = nes;
        let audio = if options.no_audio {
            None
        } else {
            match AudioOutput::new() {
                Ok(audio) => Some(audio),
                Err(err) => {
                    eprintln!("audio unavailable: {err:#}");
                    None
                }
            }
        };
        if let Some(audio) = &audio {
            nes.set_audio_sample_rate(audio.sample_rate());
        }

        let fps = options.fps.max(1);
        let status_line = match &rom {
            Some(path) => format!("Loaded {}", path.display()),
            None => "Drop a .nes file to start".to_string(),
        };

        Self {
            nes,
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
            options,
            frame_texture: None,
            status_line,
            loaded_rom: rom,
            audio,
            next_frame_at: None,
            paused: false,
        }
    }

    fn load_rom(&mut self, path: &Path) {
        match self.nes.load_rom_from_path(path) {
            Ok(()) => {
                self.loaded_rom = Some(path.to_path_buf());
                self.status_line = format!("Loaded {}", path.display());
                self.next_frame_at = None;
            }
            Err(err) => {
                self.status_line = format!("Failed to load ROM: {err}");
            }
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());
        for file in dropped {
            if let Some(path) = file.path {
                let is_nes = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("nes"))
                    .unwrap_or(false);
                if is_nes {
                    self.load_rom(&path);
                } else {
                    self.status_line = format!("Unsupported file: {}", path.display());
                }
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.input(|i| i.key_pressed(Key::R)) && self.nes.has_rom() {
            self.nes.reset();
            self.next_frame_at = None;
            self.status_line = "Reset complete".to_string();
        }
        if ctx.input(|i| i.key_pressed(Key::P)) && self.nes.has_rom() {
            self.paused = !self.paused;
        }
    }

    fn run_frame(&mut self, ctx: &egui::Context) {
        let pad1 = ctx.input(|input| self.options.keymap1.state(input));
        let pad2 = ctx.input(|input| self.options.keymap2.state(input));
        self.nes.set_controller_states(pad1, pad2);
        self.nes.run_frame();

        let samples = self.nes.take_audio_samples();
        if let Some(audio) = &self.audio {
            audio.push_samples(&samples);
        }
    }

    fn update_texture(&mut self, ctx: &egui::Context) {
        if self.options.bg_fallback {
            self.nes.render_fallback_frame();
        }

        // Core output is ARGB; egui wants RGBA bytes.
        let mut rgba = Vec::with_capacity(FRAME_WIDTH * FRAME_HEIGHT * 4);
        for argb in self.nes.frame_buffer() {
            rgba.push((argb >> 16) as u8);
            rgba.push((argb >> 8) as u8);
            rgba.push(*argb as u8);
            rgba.push(0xFF);
        }
        let image = ColorImage::from_rgba_unmultiplied([FRAME_WIDTH, FRAME_HEIGHT], &rgba);

        if let Some(texture) = self.frame_texture.as_mut() {
            texture.set(image, TextureOptions::NEAREST);
        } else {
            self.frame_texture =
                Some(ctx.load_texture("nes-frame", image, TextureOptions::NEAREST));
        }
    }
}

impl eframe::App for NesApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_dropped_files(ctx);
        self.handle_shortcuts(ctx);

        if self.nes.has_rom() && !self.paused {
            let now = Instant::now();
            let mut next = self.next_frame_at.unwrap_or(now);
            let mut ran_frames = 0u32;

            while Instant::now() >= next && ran_frames < MAX_FRAMES_PER_UPDATE {
                self.run_frame(ctx);
                ran_frames += 1;
                next += self.frame_interval;
            }
            if ran_frames == 0 && now > next + self.frame_interval {
                next = now;
            }
            self.next_frame_at = Some(next);
        }

        self.update_texture(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let has_rom = self.nes.has_rom();
                if ui
                    .add_enabled(has_rom, egui::Button::new("Reset (R)"))
                    .clicked()
                {
                    self.nes.reset();
                    self.next_frame_at = None;
                    self.status_line = "Reset complete".to_string();
                }
                let pause_label = if self.paused {
                    "Resume (P)"
                } else {
                    "Pause (P)"
                };
                if ui
                    .add_enabled(has_rom, egui::Button::new(pause_label))
                    .clicked()
                {
                    self.paused = !self.paused;
                }
                if let Some(path) = &self.loaded_rom {
                    ui.separator();
                    ui.label(path.display().to_string());
                }
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                ui.label(&self.status_line);
                ui.separator();
                match self.nes.mirroring() {
                    Some(mirroring) => ui.label(format!("NROM, {mirroring} mirroring")),
                    None => ui.label("No ROM"),
                };
                ui.separator();
                match &self.audio {
                    Some(audio) => ui.label(format!(
                        "Audio: {} Hz ({} queued)",
                        audio.sample_rate(),
                        audio.queued_samples()
                    )),
                    None => ui.label("Audio: off"),
                };
            });

            if self.options.debug_ppu {
                ui.separator();
                let (a, x, y, p, s, pc) = self.nes.debug_cpu_regs();
                let (scanline, dot) = self.nes.debug_ppu_scanline_dot();
                let (v, t, fine_x, toggle) = self.nes.debug_ppu_loopy();
                let (unknown, last_op, last_pc) = self.nes.debug_unknown_opcodes();
                ui.monospace(format!(
                    "CPU A={a:02X} X={x:02X} Y={y:02X} P={p:02X} S={s:02X} PC={pc:04X} cycles={}",
                    self.nes.debug_total_cycles()
                ));
                ui.monospace(format!(
                    "PPU sl={scanline} dot={dot} v={v:04X} t={t:04X} x={fine_x} w={}",
                    u8::from(toggle)
                ));
                if unknown > 0 {
                    ui.monospace(format!(
                        "unknown opcodes: {unknown} (last ${last_op:02X} @ ${last_pc:04X})"
                    ));
                }
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                let available = ui.available_size();
                let scale_x = (available.x / FRAME_WIDTH as f32).max(1.0);
                let scale_y = (available.y / FRAME_HEIGHT as f32).max(1.0);
                let scale = scale_x.min(scale_y).floor().max(1.0);
                let target = egui::vec2(FRAME_WIDTH as f32 * scale, FRAME_HEIGHT as f32 * scale);

                if let Some(texture) = &self.frame_texture {
                    ui.add(egui::Image::new(texture).fit_to_exact_size(target));
                }
            });
        });

        if let Some(next) = self.next_frame_at {
            let wait = next.saturating_duration_since(Instant::now());
            ctx.request_repaint_after(wait.min(self.frame_interval));
        } else {
            ctx.request_repaint_after(self.frame_interval);
        }
    }
}
