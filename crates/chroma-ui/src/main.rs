mod audio;
mod logger;

use std::fs::File;
use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use chroma_core::audio_queue::sample_queue;
use chroma_core::gb::cartridge::Cartridge;
use chroma_core::gb::GameBoy;
use chroma_core::gba::Advance;
use chroma_core::{AudioFilter, Button, Console};
use clap::Parser;
use pixels::{Pixels, SurfaceTexture};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window};

const FRAME_RATE: f64 = 59.7275;
const FRAME_TIME: Duration = Duration::from_nanos((1e9_f64 / FRAME_RATE) as u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ConsoleChoice {
    Dmg,
    Cgb,
    Agb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum FilterChoice {
    Iir,
    Nearest,
}

#[derive(Parser)]
#[command(name = "chroma", about = "Game Boy / Game Boy Color / Game Boy Advance emulator")]
struct Args {
    /// Path to ROM file
    rom: std::path::PathBuf,

    /// Console to emulate (default: detect from the ROM header)
    #[arg(short = 'm', value_enum)]
    mode: Option<ConsoleChoice>,

    /// Log level
    #[arg(short = 'l', value_enum)]
    log_level: Option<logger::LogChoice>,

    /// Integer pixel scale
    #[arg(short = 's', default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..=15))]
    scale: u32,

    /// Start fullscreen
    #[arg(short = 'f')]
    fullscreen: bool,

    /// Audio resampling filter
    #[arg(long, value_enum, default_value_t = FilterChoice::Iir)]
    filter: FilterChoice,

    /// Force the MBC1 multicart wiring
    #[arg(long)]
    multicart: bool,
}

/// Either emulated machine behind one frame-stepped interface.
enum Machine {
    Gb(Box<GameBoy>),
    Agb(Box<Advance>),
}

impl Machine {
    fn run_frame(&mut self) -> Result<(), chroma_core::CoreError> {
        match self {
            Machine::Gb(gb) => gb.run_frame(),
            Machine::Agb(agb) => {
                agb.run_frame();
                Ok(())
            }
        }
    }

    fn set_button(&mut self, button: Button, pressed: bool) {
        match self {
            Machine::Gb(gb) => gb.set_button(button, pressed),
            Machine::Agb(agb) => agb.set_button(button, pressed),
        }
    }

    fn resolution(&self) -> (u32, u32) {
        match self {
            Machine::Gb(_) => (160, 144),
            Machine::Agb(_) => (240, 160),
        }
    }

    fn frame(&self) -> &[u16] {
        match self {
            Machine::Gb(gb) => gb.bus.ppu.frame(),
            Machine::Agb(agb) => agb.bus.lcd.frame(),
        }
    }

    fn save(&mut self) {
        match self {
            Machine::Gb(gb) => gb.save(),
            Machine::Agb(agb) => agb.save(),
        }
    }
}

fn button_for(code: KeyCode) -> Option<Button> {
    Some(match code {
        KeyCode::ArrowUp | KeyCode::KeyW => Button::Up,
        KeyCode::ArrowDown | KeyCode::KeyS => Button::Down,
        KeyCode::ArrowLeft | KeyCode::KeyA => Button::Left,
        KeyCode::ArrowRight | KeyCode::KeyD => Button::Right,
        KeyCode::KeyX => Button::A,
        KeyCode::KeyZ => Button::B,
        KeyCode::KeyQ => Button::L,
        KeyCode::KeyE => Button::R,
        KeyCode::Enter => Button::Start,
        KeyCode::ShiftRight | KeyCode::Backspace => Button::Select,
        _ => return None,
    })
}

/// Write the current frame as a binary PPM, expanding BGR555 to RGB8.
fn screenshot(frame: &[u16], width: u32, height: u32) -> std::io::Result<()> {
    let mut file = File::create("screenshot.ppm")?;
    write!(file, "P6\n{width} {height}\n255\n")?;
    let mut data = Vec::with_capacity(frame.len() * 3);
    for &pixel in frame {
        for channel in [pixel & 0x1F, (pixel >> 5) & 0x1F, (pixel >> 10) & 0x1F] {
            data.push(((channel << 3) | (channel >> 2)) as u8);
        }
    }
    file.write_all(&data)
}

fn present(pixels: &mut Pixels, frame: &[u16]) {
    for (dst, &src) in pixels.frame_mut().chunks_exact_mut(4).zip(frame.iter()) {
        let r = (src & 0x1F) as u8;
        let g = ((src >> 5) & 0x1F) as u8;
        let b = ((src >> 10) & 0x1F) as u8;
        dst[0] = (r << 3) | (r >> 2);
        dst[1] = (g << 3) | (g >> 2);
        dst[2] = (b << 3) | (b >> 2);
        dst[3] = 0xFF;
    }
}

fn load_machine(args: &Args) -> Result<Machine, chroma_core::LoadError> {
    let forced = args.mode.map(|m| match m {
        ConsoleChoice::Dmg => Console::Dmg,
        ConsoleChoice::Cgb => Console::Cgb,
        ConsoleChoice::Agb => Console::Agb,
    });
    let (rom, console) = chroma_core::load_rom(&args.rom, forced)?;
    let filter = match args.filter {
        FilterChoice::Iir => AudioFilter::Iir,
        FilterChoice::Nearest => AudioFilter::Nearest,
    };

    match console {
        Console::Dmg | Console::Cgb => {
            // Re-read through the cartridge loader to pick up the .sav file.
            let cart = Cartridge::from_file(&args.rom, args.multicart).map_err(|source| {
                chroma_core::LoadError::Io {
                    path: args.rom.display().to_string(),
                    source,
                }
            })?;
            Ok(Machine::Gb(Box::new(GameBoy::new(console, cart, filter))))
        }
        Console::Agb => {
            let bios = chroma_core::load_agb_bios()?;
            let mut agb = Advance::new(rom, Some(bios));
            agb.attach_save(&args.rom);
            Ok(Machine::Agb(Box::new(agb)))
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init(args.log_level);

    let mut machine = match load_machine(&args) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (producer, consumer) = sample_queue(8192);
    match &mut machine {
        Machine::Gb(gb) => gb.connect_audio(producer),
        Machine::Agb(agb) => agb.connect_audio(producer),
    }
    let _stream = audio::start_stream(consumer);

    let (width, height) = machine.resolution();
    let event_loop = match EventLoop::new() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("could not create window event loop: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut attrs = Window::default_attributes()
        .with_title("chroma")
        .with_inner_size(winit::dpi::LogicalSize::new(
            (width * args.scale) as f64,
            (height * args.scale) as f64,
        ));
    if args.fullscreen {
        attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
    }
    #[allow(deprecated)]
    let window = match event_loop.create_window(attrs) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("could not create window: {e}");
            return ExitCode::FAILURE;
        }
    };

    let size = window.inner_size();
    let surface = SurfaceTexture::new(size.width, size.height, &window);
    let mut pixels = match Pixels::new(width, height, surface) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("could not create render surface: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut paused = false;
    let mut frame_advance = false;
    let mut hidden = false;
    let mut next_frame = Instant::now() + FRAME_TIME;

    #[allow(deprecated)]
    let run_result = event_loop.run(move |event, target| {
        target.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    machine.save();
                    target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    let _ = pixels.resize_surface(new_size.width, new_size.height);
                }
                WindowEvent::Occluded(occluded) => hidden = occluded,
                WindowEvent::KeyboardInput { event: key, .. } => {
                    let PhysicalKey::Code(code) = key.physical_key else {
                        return;
                    };
                    let pressed = key.state == ElementState::Pressed;
                    if let Some(button) = button_for(code) {
                        machine.set_button(button, pressed);
                        return;
                    }
                    if !pressed || key.repeat {
                        return;
                    }
                    match code {
                        KeyCode::Escape => {
                            machine.save();
                            target.exit();
                        }
                        KeyCode::KeyP => paused = !paused,
                        KeyCode::KeyN => frame_advance = true,
                        KeyCode::KeyL => logger::cycle_level(),
                        KeyCode::F11 => {
                            let full = window.fullscreen().is_none();
                            window.set_fullscreen(
                                full.then_some(Fullscreen::Borderless(None)),
                            );
                        }
                        KeyCode::F12 => {
                            if let Err(e) = screenshot(machine.frame(), width, height) {
                                eprintln!("screenshot failed: {e}");
                            }
                        }
                        _ => {}
                    }
                }
                WindowEvent::RedrawRequested => {
                    present(&mut pixels, machine.frame());
                    if let Err(e) = pixels.render() {
                        eprintln!("render failed: {e}");
                        target.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                // The pause flag is only sampled here, at frame granularity.
                if !paused || frame_advance {
                    frame_advance = false;
                    if let Err(e) = machine.run_frame() {
                        // Real hardware would lock up here; surface it loudly.
                        eprintln!("{e}");
                        machine.save();
                        std::process::exit(1);
                    }
                }

                // Lock the loop to the emulated timebase.
                let now = Instant::now();
                if now < next_frame {
                    std::thread::sleep(next_frame - now);
                }
                next_frame += FRAME_TIME;
                if next_frame < Instant::now() {
                    next_frame = Instant::now() + FRAME_TIME;
                }

                if !hidden {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    });

    if let Err(e) = run_result {
        eprintln!("event loop error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
