//! Machine simulator CLI.
//!
//! Builds the reference platform (RAM, UART, INTC, RTC, timer, MPU), loads
//! guest images, and dispatches until the guest exits, faults, or the step
//! bound is reached. A guest `ecall` with `a0 == 0x666` is the clean exit
//! convention; `a1` carries the guest status. Exit code 0 on clean guest
//! exit, 1 on any host or guest error.

mod cons;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use rvmach_core::common::reg::{REG_A0, REG_A1};
use rvmach_core::config::MachineConfig;
use rvmach_core::core::{Arch, CORE_OPT_TRAP_SYSCALL, CoreMode, CoreParams};
use rvmach_core::devices::uart::UartChannel;
use rvmach_core::loader;
use rvmach_core::{Error, Machine};

#[derive(Parser, Debug)]
#[command(
    name = "rvmach",
    version,
    about = "User-space machine simulator for small RISC-V systems",
    long_about = "Load one or more guest images into the reference platform and run them.\n\n\
        Examples:\n  rvmach test.elf\n  rvmach --monitor fw.elf --kernel payload.elf\n  \
        rvmach --raw blob.bin:0x20000 --entry 0x20000 --console"
)]
struct Cli {
    /// ELF to load and configure as the boot image.
    #[arg(short, long)]
    monitor: Option<PathBuf>,

    /// ELF to load without configuring the entry point.
    #[arg(short, long)]
    kernel: Option<PathBuf>,

    /// Flat binary to load, as <path>:<addr>.
    #[arg(short, long)]
    raw: Option<String>,

    /// Override the entry address.
    #[arg(short, long, value_parser = parse_num)]
    entry: Option<u64>,

    /// Number of instructions to execute before exiting; 0 for infinite.
    #[arg(short, long, default_value_t = rvmach_core::config::defaults::STEP_LIMIT)]
    step: u64,

    /// Drop into the debug console before execution.
    #[arg(short, long)]
    console: bool,

    /// UART routing: '-' (stdout), 'null', or a file path.
    #[arg(long, default_value = "-")]
    serial: String,

    /// Verbose logging (or set RUST_LOG).
    #[arg(short, long)]
    verbose: bool,

    /// ELF to load and run (same as --monitor).
    executable: Option<PathBuf>,
}

/// Accepts `0x`-prefixed hex or decimal.
fn parse_num(s: &str) -> Result<u64, String> {
    let parsed = s.strip_prefix("0x").map_or_else(
        || s.parse::<u64>().ok(),
        |hex| u64::from_str_radix(hex, 16).ok(),
    );
    parsed.ok_or_else(|| format!("invalid number: {s}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn run(cli: Cli) -> Result<(), ()> {
    let config = MachineConfig::default();
    let platform = &config.platform;

    let mut machine = Machine::new().map_err(report)?;
    machine
        .add_mem(platform.mem_base, platform.mem_size)
        .map_err(report)?;
    let _intc = machine
        .add_intc(platform.intc_base, "intc0")
        .map_err(report)?;
    let _rtc = machine.add_rtc(platform.rtc_base, "rtc").map_err(report)?;
    let uart = machine
        .add_uart(platform.uart_base, "uart0")
        .map_err(report)?;
    let _timer = machine
        .add_timer(platform.timer_base, "timer0", platform.timer_irq_line)
        .map_err(report)?;

    match cli.serial.as_str() {
        "-" => {}
        "null" => uart.set_channel(UartChannel::Null),
        path if path.starts_with("port:") => {
            eprintln!("serial port routing is not implemented");
            return Err(());
        }
        path => match std::fs::File::create(path) {
            Ok(f) => uart.set_channel(UartChannel::File(f)),
            Err(e) => {
                eprintln!("cannot open serial file {path}: {e}");
                return Err(());
            }
        },
    }

    let params = CoreParams {
        arch: Arch::Riscv,
        mode: CoreMode::Mode32,
        options: CORE_OPT_TRAP_SYSCALL,
        ..CoreParams::default()
    };
    let core_id = machine.add_core(&params).map_err(report)?;
    let _mpu = machine
        .add_mpu(platform.mpu_base, "mpu0", core_id)
        .map_err(report)?;

    load_images(&mut machine, core_id, &cli)?;

    if let Some(entry) = cli.entry {
        machine
            .core_mut(core_id)
            .map_err(report)?
            .core_state_mut()
            .pc = entry;
    }

    if cli.console {
        cons::run(&mut machine, core_id);
    }

    let status = if cli.step == 0 {
        match machine.core_thread_run(core_id) {
            Ok(()) => machine.core_join(core_id),
            Err(e) => Err(e),
        }
    } else {
        machine.core_step(core_id, cli.step)
    };

    finish(&machine, core_id, status)
}

fn load_images(machine: &mut Machine, core_id: usize, cli: &Cli) -> Result<(), ()> {
    let mut configured = false;

    let monitor = cli.monitor.as_ref().or(cli.executable.as_ref());
    if let Some(path) = monitor {
        let image = loader::load_elf_path(path).map_err(report)?;
        machine.load_core(core_id, &image, true).map_err(report)?;
        configured = true;
    }
    if let Some(path) = &cli.kernel {
        let image = loader::load_elf_path(path).map_err(report)?;
        machine.load_core(core_id, &image, false).map_err(report)?;
    }
    if let Some(spec) = &cli.raw {
        let Some((path, addr)) = spec.rsplit_once(':') else {
            eprintln!("--raw wants <path>:<addr>");
            return Err(());
        };
        let addr = parse_num(addr).map_err(|e| eprintln!("{e}"))?;
        let data = std::fs::read(path).map_err(|e| {
            eprintln!("cannot read {path}: {e}");
        })?;
        machine
            .load_core_raw(core_id, addr, &data)
            .map_err(report)?;
    }

    if !configured && cli.entry.is_none() && cli.raw.is_none() && cli.kernel.is_none() {
        eprintln!("nothing to run; pass an executable or --raw (see --help)");
        return Err(());
    }
    Ok(())
}

/// Applies the exit convention to the final run status.
fn finish(machine: &Machine, core_id: usize, status: rvmach_core::Result<()>) -> Result<(), ()> {
    let core = machine.core(core_id).map_err(report)?;
    let ticks = core.core_state().ticks;

    match status {
        Ok(()) | Err(Error::Exited) => {
            println!("{ticks} instructions dispatched");
            Ok(())
        }
        Err(Error::Syscall) => {
            let a0 = core.core_state().get_reg(REG_A0);
            if a0 != 0x666 {
                println!("unexpected exit syscall {a0:#x}");
                return Err(());
            }
            let a1 = core.core_state().get_reg(REG_A1) as i64;
            println!("{ticks} instructions dispatched");
            if a1 != 0 {
                println!("executable exit status: {a1}");
                return Err(());
            }
            Ok(())
        }
        Err(e) => {
            println!("unexpected run status: {e}");
            println!("{}", core.core_state().state_dump());
            Err(())
        }
    }
}

fn report(e: Error) {
    error!("{e}");
    eprintln!("error: {e}");
}
