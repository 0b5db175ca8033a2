//! Interactive debug console.
//!
//! Line-oriented shell over a stopped core: step, inspect and modify
//! registers, and dump memory. Commands:
//!
//! ```text
//! step [n]                 dispatch n instructions (default 1)
//! reg [name [value]]       show all registers / one register / set one
//! mem r<size> <addr> [n]   read n entries of 1/2/4/8 bytes
//! mem w<size> <addr> ...   not implemented
//! help                     this text
//! quit                     leave the console
//! ```

use std::io::{BufRead, Write};

use rvmach_core::Machine;
use rvmach_core::common::reg::{name_for_reg, reg_for_name};

fn parse_num(s: &str) -> Option<u64> {
    s.strip_prefix("0x").map_or_else(
        || s.parse::<u64>().ok(),
        |hex| u64::from_str_radix(hex, 16).ok(),
    )
}

/// Runs the console until `quit` or end of input.
pub fn run(machine: &mut Machine, core_id: usize) {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("rvmach> ");
        let _ = std::io::stdout().flush();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = args.first() else {
            continue;
        };
        match cmd {
            "quit" | "q" => return,
            "help" | "?" => help(),
            "step" | "s" => cmd_step(machine, core_id, &args),
            "reg" | "r" => cmd_reg(machine, core_id, &args),
            "mem" | "m" => cmd_mem(machine, core_id, &args),
            _ => println!("unknown command '{cmd}' (try 'help')"),
        }
    }
}

fn help() {
    println!("step [n]                 dispatch n instructions (default 1)");
    println!("reg [name [value]]       show or set registers");
    println!("mem r<size> <addr> [n]   read memory (size 1/2/4/8)");
    println!("help                     this text");
    println!("quit                     leave the console");
}

fn cmd_step(machine: &mut Machine, core_id: usize, args: &[&str]) {
    let num = args.get(1).and_then(|s| parse_num(s)).unwrap_or(1);
    if let Err(e) = machine.core_step(core_id, num) {
        println!("step stopped: {e}");
    }
    if let Ok(core) = machine.core(core_id) {
        let st = core.core_state();
        println!("pc={:#x} ticks={}", st.pc, st.ticks);
    }
}

fn cmd_reg(machine: &mut Machine, core_id: usize, args: &[&str]) {
    match args.len() {
        1 => {
            let Ok(core) = machine.core(core_id) else {
                println!("core is running");
                return;
            };
            let st = core.core_state();
            println!("pc   {:016x}", st.pc);
            for i in 0..32 {
                print!("{:<4} {:016x}  ", name_for_reg(i), st.get_reg(i));
                if i % 4 == 3 {
                    println!();
                }
            }
        }
        2 => {
            let Ok(core) = machine.core(core_id) else {
                println!("core is running");
                return;
            };
            let st = core.core_state();
            if args[1] == "pc" {
                println!("pc = {:#x}", st.pc);
            } else if let Some(idx) = reg_for_name(args[1]) {
                println!("{} = {:#x}", args[1], st.get_reg(idx));
            } else {
                println!("unknown register '{}'", args[1]);
            }
        }
        3 => {
            let Some(value) = parse_num(args[2]) else {
                println!("bad value '{}'", args[2]);
                return;
            };
            let Ok(core) = machine.core_mut(core_id) else {
                println!("core is running");
                return;
            };
            if args[1] == "pc" {
                core.core_state_mut().pc = value;
            } else if let Some(idx) = reg_for_name(args[1]) {
                core.core_state_mut().set_reg(idx, value);
            } else {
                println!("unknown register '{}'", args[1]);
            }
        }
        _ => println!("usage: reg [name [value]]"),
    }
}

fn cmd_mem(machine: &mut Machine, core_id: usize, args: &[&str]) {
    let (Some(&op), Some(&addr)) = (args.get(1), args.get(2)) else {
        println!("usage: mem r<size> <addr> [num]");
        return;
    };
    let Some(addr) = parse_num(addr) else {
        println!("bad address");
        return;
    };
    let size: u64 = match &op[1..] {
        "1" | "" => 1,
        "2" => 2,
        "4" => 4,
        "8" => 8,
        _ => {
            println!("bad size (1/2/4/8)");
            return;
        }
    };
    if op.starts_with('w') {
        println!("memory writes are not implemented");
        return;
    }
    if !op.starts_with('r') {
        println!("usage: mem r<size> <addr> [num]");
        return;
    }
    let num = args.get(3).and_then(|s| parse_num(s)).unwrap_or(1);

    let Ok(core) = machine.core(core_id) else {
        println!("core is running");
        return;
    };
    let mut buf = vec![0u8; (size * num) as usize];
    if let Err(e) = core.core_state().mem_read(addr, &mut buf) {
        println!("read failed: {e}");
        return;
    }
    for (i, chunk) in buf.chunks(size as usize).enumerate() {
        let a = addr + i as u64 * size;
        if i % (16 / size as usize).max(1) == 0 {
            if i != 0 {
                println!();
            }
            print!("{a:10x}: ");
        }
        let mut v: u64 = 0;
        for (j, b) in chunk.iter().enumerate() {
            v |= u64::from(*b) << (8 * j);
        }
        print!("{v:0w$x} ", w = 2 * size as usize);
    }
    println!();
}
