use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};

use phosphor::app::{AppOptions, KeyMap, NesApp};
use phosphor::nes::{CPU_CYCLES_PER_FRAME, Nes};

#[derive(Debug)]
struct Config {
    rom: PathBuf,
    frames: u32,
    trace_ins: u32,
    trace_frames: u32,
    gui: bool,
    no_audio: bool,
    fps: u32,
    p1map: Option<String>,
    p2map: Option<String>,
    config_file: Option<PathBuf>,
    debug_ppu: bool,
    bg_fallback: bool,
}

fn usage(program: &str) {
    eprintln!(
        "Usage: {program} <rom.nes> [--frames N] [--trace-ins N] [--trace-frames N] \
         [--gui] [--no-audio] [--fps N] [--p1map CSV] [--p2map CSV] [--config FILE] \
         [--debug-ppu] [--bg-fallback]"
    );
}

fn parse_args() -> Result<Config> {
    let mut args = std::env::args().skip(1);
    let rom = args
        .next()
        .filter(|arg| !arg.starts_with("--"))
        .context("expected a ROM path as the first argument")?;

    let mut cfg = Config {
        rom: PathBuf::from(rom),
        frames: 300,
        trace_ins: 0,
        trace_frames: 0,
        gui: false,
        no_audio: false,
        fps: 60,
        p1map: None,
        p2map: None,
        config_file: None,
        debug_ppu: false,
        bg_fallback: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args.next().context("--frames requires a count")?;
                cfg.frames = value
                    .parse()
                    .with_context(|| format!("invalid --frames value: {value}"))?;
            }
            "--trace-ins" => {
                let value = args.next().context("--trace-ins requires a count")?;
                cfg.trace_ins = value
                    .parse()
                    .with_context(|| format!("invalid --trace-ins value: {value}"))?;
            }
            "--trace-frames" => {
                let value = args.next().context("--trace-frames requires a count")?;
                cfg.trace_frames = value
                    .parse()
                    .with_context(|| format!("invalid --trace-frames value: {value}"))?;
            }
            "--gui" => cfg.gui = true,
            "--no-audio" => cfg.no_audio = true,
            "--fps" => {
                let value = args.next().context("--fps requires a rate")?;
                cfg.fps = value
                    .parse()
                    .with_context(|| format!("invalid --fps value: {value}"))?;
            }
            "--p1map" => cfg.p1map = Some(args.next().context("--p1map requires a CSV")?),
            "--p2map" => cfg.p2map = Some(args.next().context("--p2map requires a CSV")?),
            "--config" => {
                cfg.config_file = Some(PathBuf::from(
                    args.next().context("--config requires a path")?,
                ));
            }
            "--debug-ppu" => cfg.debug_ppu = true,
            "--bg-fallback" => cfg.bg_fallback = true,
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    Ok(cfg)
}

/// Apply a `key = value` config file beneath the command line: fps, audio,
/// p1map, p2map. Lines starting with `#` or `;` are comments.
fn apply_config_file(cfg: &mut Config) {
    let Some(path) = cfg.config_file.clone() else {
        return;
    };
    let Ok(text) = std::fs::read_to_string(&path) else {
        eprintln!("Warning: could not read config file {}", path.display());
        return;
    };

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "fps" => {
                if let Ok(fps) = value.parse::<u32>() {
                    if fps > 0 {
                        cfg.fps = fps;
                    }
                }
            }
            "audio" => match value.to_ascii_lowercase().as_str() {
                "off" | "0" | "false" => cfg.no_audio = true,
                "on" | "1" | "true" => cfg.no_audio = false,
                _ => {}
            },
            "p1map" => {
                if cfg.p1map.is_none() {
                    cfg.p1map = Some(value.to_string());
                }
            }
            "p2map" => {
                if cfg.p2map.is_none() {
                    cfg.p2map = Some(value.to_string());
                }
            }
            _ => {}
        }
    }
}

fn build_keymap(csv: Option<&str>, fallback: KeyMap, which: &str) -> KeyMap {
    match csv {
        Some(csv) => match KeyMap::parse(csv) {
            Ok(map) => map,
            Err(err) => {
                eprintln!("Warning: bad {which} mapping ({err}), using defaults");
                fallback
            }
        },
        None => fallback,
    }
}

fn run_headless(mut nes: Nes, cfg: &Config) {
    if cfg.trace_ins > 0 {
        println!("Tracing {} instructions...", cfg.trace_ins);
        for i in 0..cfg.trace_ins {
            let (_, _, _, _, _, pc) = nes.debug_cpu_regs();
            let opcode = nes.peek(pc);
            let used = nes.step();
            let (a, x, y, p, s, _) = nes.debug_cpu_regs();
            println!(
                "ins {:6}  PC:{pc:04X} OP:{opcode:02X}  A:{a:02X} X:{x:02X} Y:{y:02X} \
                 P:{p:02X} S:{s:02X}  cyc+{used}",
                i + 1
            );
        }
    }

    println!("Running {} frames...", cfg.frames);
    let start = Instant::now();
    for frame in 0..cfg.frames {
        nes.run_cycles(CPU_CYCLES_PER_FRAME);
        // Headless runs discard audio instead of letting it pile up.
        let _ = nes.take_audio_samples();

        if frame < cfg.trace_frames {
            let (a, x, y, p, s, pc) = nes.debug_cpu_regs();
            println!(
                "frame {:5}  PC:{pc:04X}  A:{a:02X} X:{x:02X} Y:{y:02X} P:{p:02X} S:{s:02X}",
                frame + 1
            );
        }
    }
    let elapsed = start.elapsed();
    println!(
        "Ran {} frames in {:.2}s ({:.1} fps)",
        cfg.frames,
        elapsed.as_secs_f64(),
        cfg.frames as f64 / elapsed.as_secs_f64().max(1e-9)
    );
}

fn run_gui(nes: Nes, cfg: &Config) -> Result<()> {
    let options = AppOptions {
        keymap1: build_keymap(cfg.p1map.as_deref(), KeyMap::player_one_default(), "p1"),
        keymap2: build_keymap(cfg.p2map.as_deref(), KeyMap::player_two_default(), "p2"),
        fps: cfg.fps,
        no_audio: cfg.no_audio,
        debug_ppu: cfg.debug_ppu,
        bg_fallback: cfg.bg_fallback,
    };
    let rom = Some(cfg.rom.clone());

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 720.0])
            .with_min_inner_size([512.0, 480.0])
            .with_title("Phosphor"),
        vsync: true,
        ..Default::default()
    };

    eframe::run_native(
        "Phosphor",
        native_options,
        Box::new(move |cc| Ok(Box::new(NesApp::new(cc, nes, rom, options)))),
    )
    .map_err(|err| anyhow::anyhow!("failed to run app: {err}"))
}

fn main() -> ExitCode {
    let mut cfg = match parse_args() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Error: {err:#}");
            usage("phosphor");
            return ExitCode::from(1);
        }
    };
    apply_config_file(&mut cfg);

    let mut nes = Nes::new();
    if let Err(err) = nes.load_rom_from_path(&cfg.rom) {
        eprintln!(
            "Failed to load ROM '{}': {err}. Only iNES mapper 0 is supported.",
            cfg.rom.display()
        );
        return ExitCode::from(2);
    }

    if cfg.gui {
        if let Err(err) = run_gui(nes, &cfg) {
            eprintln!("Error: {err:#}");
            return ExitCode::from(1);
        }
    } else {
        run_headless(nes, &cfg);
    }

    ExitCode::SUCCESS
}
