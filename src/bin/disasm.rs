use snes_cpu::{
    Cpu, DecodeContext, Disassembler, DispatchTable, Interpreter, InterpreterConfig, MemoryBin,
    MemoryContainer, RegisterSnapshot,
};
use std::env;
use std::path::PathBuf;
use std::process;

// Raw 65C816 disassembler / stepper
// Usage:
//   cargo run --bin disasm -- program.bin --load 0x8000 --start 0x8000 --run 100
// Environment fallbacks: DISASM_LOAD, DISASM_START, DISASM_RUN

const DEFAULT_CONTAINER_SIZE: usize = 0x2_0000;

struct Options {
    image: PathBuf,
    load: u32,
    start: u32,
    run: Option<u64>,
    native: bool,
}

fn parse_u32_hex_or_dec(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(stripped) = s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
        u32::from_str_radix(stripped, 16).ok()
    } else {
        s.parse::<u32>().ok()
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|s| parse_u32_hex_or_dec(&s))
}

fn parse_args() -> Result<Options, String> {
    let mut args = env::args().skip(1);
    let mut image: Option<PathBuf> = None;
    let mut load: Option<u32> = None;
    let mut start: Option<u32> = None;
    let mut run: Option<u64> = None;
    let mut native = false;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--load" => load = args.next().as_deref().and_then(parse_u32_hex_or_dec),
            "--start" => start = args.next().as_deref().and_then(parse_u32_hex_or_dec),
            "--run" => {
                run = args
                    .next()
                    .as_deref()
                    .and_then(parse_u32_hex_or_dec)
                    .map(u64::from)
            }
            "--native" => native = true,
            _ => {
                if image.is_none() {
                    image = Some(PathBuf::from(&a));
                }
            }
        }
    }

    let image = image.ok_or("usage: disasm <image> [--load addr] [--start addr] [--run n] [--native]")?;
    let load = load.or_else(|| env_u32("DISASM_LOAD")).unwrap_or(0);
    let start = start.or_else(|| env_u32("DISASM_START")).unwrap_or(load);
    let run = run.or_else(|| env_u32("DISASM_RUN").map(u64::from));

    Ok(Options {
        image,
        load,
        start,
        run,
        native,
    })
}

fn execute(opts: &Options, bus: MemoryBin, table: DispatchTable) -> Result<(), String> {
    let mut cpu = Cpu::new();
    if opts.native {
        cpu.state.enter_native();
    }
    let interp = Interpreter::with_table(cpu, table, InterpreterConfig::from_env());

    let mut bus = bus;
    let steps = opts.run.unwrap_or(0);
    let mut start = Some(opts.start);
    for _ in 0..steps {
        let record = interp
            .run_once(&mut bus, start.take())
            .map_err(|e| e.to_string())?;
        let cpu = interp.cpu();
        if record.is_none() || cpu.state.stopped || cpu.state.waiting_for_irq {
            break;
        }
    }

    if let Some(err) = interp.last_error() {
        eprintln!("stopped on error: {}", err);
    }
    let snapshot = RegisterSnapshot::from(&interp.cpu().state);
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn main() {
    env_logger::init();

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(2);
        }
    };

    let image = match std::fs::read(&opts.image) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("failed to read {:?}: {}", opts.image, e);
            process::exit(1);
        }
    };

    let result = (|| -> Result<(), String> {
        let size = DEFAULT_CONTAINER_SIZE.max(opts.load as usize + image.len());
        let mem = MemoryContainer::new(size).map_err(|e| e.to_string())?;
        mem.load(opts.load as usize, &image).map_err(|e| e.to_string())?;
        let table = DispatchTable::standard().map_err(|e| e.to_string())?;

        // view ends with the image so the listing stops there
        let program = MemoryBin::new(&mem, 0, opts.load as usize + image.len().max(1))
            .map_err(|e| e.to_string())?;
        // widths start at the reset setting; REP/SEP only widen them in native code
        let records = Disassembler::new(&table, &program, opts.load, DecodeContext::default())
            .follow_width_changes(true)
            .emulation_mode(!opts.native);
        for record in records {
            match record {
                Ok(record) => println!("{}", record),
                Err(e) => {
                    eprintln!("disassembly stopped: {}", e);
                    break;
                }
            }
        }

        if opts.run.is_some() {
            execute(&opts, mem.view(), table)?;
        }
        Ok(())
    })();

    if let Err(msg) = result {
        eprintln!("{}", msg);
        process::exit(1);
    }
}
