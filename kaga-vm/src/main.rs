use std::sync::Arc;

use clap::Parser;

use kaga_vm::adapter::Adapter;
use kaga_vm::bus::{MemoryLayout, SystemBus};
use kaga_vm::fb::PixelBuffer;
use kaga_vm::irq::CpuIntr;
use kaga_vm::regs::{RegisterFile, ADAPTER_DATA, ADAPTER_STATUS};

#[cfg(feature = "gui")]
use std::sync::mpsc;
#[cfg(feature = "gui")]
use std::time::Duration;

#[cfg(feature = "gui")]
use kaga_vm::display;
#[cfg(feature = "gui")]
use kaga_vm::irq::Device;
#[cfg(feature = "gui")]
use kaga_vm::keyboard::{KeyEvent, Keyboard};
#[cfg(feature = "gui")]
use kaga_vm::regs::{INTR_ENABLE, RECEIVER_CONTROL, RECEIVER_DATA};

#[derive(Parser, Debug)]
#[command(author, version, about = "Keyboard and graphics adapter demo", long_about = None)]
struct Args {
    /// MMIO base address (hex with 0x prefix accepted)
    #[arg(long, default_value = "0xffff0000", value_parser = parse_addr)]
    mmio_base: u64,

    /// Size of each RAM segment in bytes
    #[arg(long, default_value = "0x10000", value_parser = parse_addr)]
    segment_size: u64,

    /// Run without a window: replay the built-in command script and print
    /// each result
    #[arg(long)]
    headless: bool,
}

fn parse_addr(s: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", s, e))
}

struct Machine {
    bus: SystemBus,
    regs: Arc<RegisterFile>,
    #[cfg_attr(not(feature = "gui"), allow(dead_code))]
    cpu: Arc<CpuIntr>,
    layout: MemoryLayout,
}

fn build_machine(
    layout: MemoryLayout,
    sink: Box<dyn kaga_vm::fb::FramebufferSink>,
) -> Result<Machine, Box<dyn std::error::Error>> {
    let regs = Arc::new(RegisterFile::new());
    let cpu = Arc::new(CpuIntr::new());
    let mut bus = SystemBus::new(layout.clone(), regs.clone())?;
    let adapter = Arc::new(Adapter::new(regs.clone(), cpu.clone(), layout.clone(), sink));
    adapter.connect(&mut bus);
    Ok(Machine { bus, regs, cpu, layout })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let layout = MemoryLayout {
        mmio_base: args.mmio_base,
        text_size: args.segment_size,
        kernel_text_size: args.segment_size,
        data_size: args.segment_size,
        ..MemoryLayout::default()
    };

    if args.headless {
        let machine = build_machine(layout, Box::new(PixelBuffer::new(640, 480)))?;
        return run_script(machine);
    }

    #[cfg(feature = "gui")]
    {
        let (keys_tx, keys_rx) = mpsc::channel();
        let handle = kaga_vm::render::spawn(
            |w, h| kaga_vm::gui::WindowPresenter::new("Keyboard and Graphics Adapter", w, h),
            display::PREFERRED_WIDTH,
            display::PREFERRED_HEIGHT,
            keys_tx,
        );
        match handle {
            Ok(sink) => {
                let machine = build_machine(layout, Box::new(sink))?;
                return run_terminal(machine, keys_rx);
            }
            Err(e) => {
                log::warn!("window unavailable ({}), falling back to headless", e);
                let machine = build_machine(layout, Box::new(PixelBuffer::new(640, 480)))?;
                return run_script(machine);
            }
        }
    }

    #[cfg(not(feature = "gui"))]
    {
        eprintln!("built without the gui feature; running the headless script");
        let machine = build_machine(layout, Box::new(PixelBuffer::new(640, 480)))?;
        run_script(machine)
    }
}

/// The simulated program: the tightest possible idle loop (branch-to-self
/// plus its delay-slot nop). Fetching it is what advances command delays.
const IDLE_LOOP: [u32; 2] = [0x1000_ffff, 0x0000_0000];

fn load_idle_loop(machine: &mut Machine) -> Result<(), Box<dyn std::error::Error>> {
    let mut image = Vec::new();
    for word in IDLE_LOOP {
        image.extend_from_slice(&word.to_le_bytes());
    }
    machine.bus.load_text(&image)?;
    Ok(())
}

/// Issue one command through the bus and burn instruction fetches until the
/// adapter re-asserts ready. Returns the status written by the decoder and
/// the number of fetches the delay consumed.
fn issue(machine: &mut Machine, command: u32) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let base = machine.layout.mmio_base;
    machine.bus.write32(base + ADAPTER_DATA, command)?;
    let status = machine.regs.read_word(ADAPTER_STATUS);
    let mut fetches = 0;
    while !machine.regs.is_ready(ADAPTER_STATUS) {
        machine.bus.fetch_u32(machine.layout.text_base)?;
        fetches += 1;
    }
    Ok((status, fetches))
}

/// The classic exercise sequence for this adapter: a bit of everything,
/// including an invalid command and both fonts.
fn run_script(mut machine: Machine) -> Result<(), Box<dyn std::error::Error>> {
    load_idle_loop(&mut machine)?;
    let script: &[(u32, &str)] = &[
        (0x0004_0000, "unknown control"),
        (0x00ff_0000, "ENQ size"),
        (0x00ff_0100, "ENQ font"),
        (0xd151_1ff0, "PUT 0xD1 @ (0x51,0x1F)"),
        (0x0003_ffff, "FNT unicode"),
        (0x00ff_0100, "ENQ font"),
        (0x00ff_0200, "ENQ clear color"),
        (0x0001_2d0e, "CLR 0x2D0E"),
        (0x00ff_0200, "ENQ clear color"),
        (0x00ff_0000, "ENQ size"),
        (0xc152_20f0, "PUT 0xC1 @ (0x52,0x20)"),
    ];
    for &(command, name) in script {
        let (status, fetches) = issue(&mut machine, command)?;
        println!(
            "{:<24} {:#010x} -> status {:#010x} ({} fetches to ready)",
            name, command, status, fetches
        );
    }
    Ok(())
}

/// A keyboard-echo terminal: the scripted "program" enables the keyboard
/// interrupt, waits for keystrokes, reads receiver-data (clearing ready)
/// and echoes each character to the display with PUT commands.
#[cfg(feature = "gui")]
fn run_terminal(
    mut machine: Machine,
    keys: mpsc::Receiver<KeyEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = machine.layout.mmio_base;
    let keyboard = Keyboard::new(machine.regs.clone(), machine.cpu.clone());
    load_idle_loop(&mut machine)?;

    // Program setup: enable the keyboard interrupt, clear to dark blue.
    machine.bus.write32(base + RECEIVER_CONTROL, INTR_ENABLE)?;
    issue(&mut machine, 0x0001_000f)?;

    let (cols, rows) = (80u32, 32u32);
    let (mut col, mut row) = (0u32, 0u32);

    loop {
        // UI thread: feed window key events into the receiver path.
        match keys.recv_timeout(Duration::from_millis(16)) {
            Ok(event) => keyboard.key_event(event),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        // The program's idle loop keeps executing instructions.
        for _ in 0..64 {
            machine.bus.fetch_u32(machine.layout.text_base)?;
        }

        // Interrupt handler: consume the keystroke and echo it.
        if machine.cpu.take_pending() == Some(Device::Keyboard) {
            let data = machine.bus.read32(base + RECEIVER_DATA)?;
            if data & 0xff00 != 0 {
                continue; // non-printable key, nothing to echo
            }
            match (data & 0xff) as u8 {
                b'\n' | b'\r' => {
                    col = 0;
                    row = (row + 1) % rows;
                }
                0x08 => {
                    col = col.saturating_sub(1);
                    // White-on-black space rubs the cell out.
                    issue(&mut machine, 0x2000_00f0 | (col << 16) | (row << 8))?;
                }
                ch if ch >= 0x20 => {
                    let command = ((ch as u32) << 24) | (col << 16) | (row << 8) | 0xf0;
                    issue(&mut machine, command)?;
                    col += 1;
                    if col >= cols {
                        col = 0;
                        row = (row + 1) % rows;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}
