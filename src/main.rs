mod visualizer;

use clap::Parser;
use crisp8::emulator::{rom, vm::VirtualMachine};
use std::path::PathBuf;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(version, about = "CHIP-8 emulator")]
struct Args {
    /// ROM image to run
    rom: PathBuf,

    /// Seed for the random-value instruction; fixed seeds give reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Window pixels per machine pixel
    #[arg(long, default_value_t = 16)]
    scale: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    });

    let image = match rom::read_rom_file(&args.rom) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("can't load ROM {:?}: {}", args.rom, err);
            process::exit(1);
        }
    };

    let mut vm = VirtualMachine::new(seed);
    if let Err(err) = vm.load_rom(&image) {
        log::error!("can't load ROM {:?}: {}", args.rom, err);
        process::exit(1);
    }

    if visualizer::run(&mut vm, args.scale).is_err() {
        process::exit(1);
    }
}
