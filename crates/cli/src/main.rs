//! x86 emulation environment CLI.
//!
//! This binary exposes the non-interactive parts of the emulation environment. It performs:
//! 1. **Imports:** Map a PE32 image, resolve its imports against faked or supplied DLLs and
//!    print the resulting hook table.
//! 2. **Exports:** Print the export table of a PE32 image.
//! 3. **Dump:** Map an image and write an address range to a file or the terminal.

use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use x86emu_core::config::Config;
use x86emu_core::loader;
use x86emu_core::modules::{FixedPrompt, ImageHost, LoadDecision, LoadPolicy};
use x86emu_core::{LoadedImage, Session};

#[derive(Parser, Debug)]
#[command(
    name = "x86emu",
    author,
    version,
    about = "Runtime environment for stepping 32-bit x86 programs",
    long_about = "Map PE32 images into an emulated address space, resolve their imports into hooks, and inspect the result.\n\nLogging is controlled with RUST_LOG (e.g. RUST_LOG=x86emu_core=debug).\n\nExamples:\n  x86emu imports sample.exe --policy fake\n  x86emu imports sample.exe --dll kernel32.dll=C:/dlls/kernel32.dll\n  x86emu exports kernel32.dll\n  x86emu dump sample.exe --start 0x401000 --end 0x40107f"
)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Policy applied to DLLs that are neither supplied nor resident.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// Load supplied DLLs on demand; others stay unregistered.
    Load,
    /// Give every missing DLL a synthetic handle.
    Fake,
    /// Leave missing DLLs unregistered.
    Never,
}

impl From<Policy> for LoadPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Load => Self::Load,
            Policy::Fake => Self::Fake,
            Policy::Never => Self::Never,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Map an image, resolve its imports and print the hook table.
    Imports {
        /// PE32 image to map.
        image: PathBuf,

        /// Policy for DLLs that are not supplied with --dll.
        #[arg(long, value_enum, default_value_t = Policy::Load)]
        policy: Policy,

        /// DLL image made available to LoadLibrary, as NAME=PATH (repeatable).
        #[arg(long = "dll", value_name = "NAME=PATH")]
        dlls: Vec<String>,

        /// Write the saved session blob to this file.
        #[arg(long)]
        save_state: Option<PathBuf>,
    },

    /// Print the export table of a PE32 image.
    Exports {
        /// PE32 image to inspect.
        image: PathBuf,
    },

    /// Map an image and dump an inclusive address range.
    Dump {
        /// PE32 image to map.
        image: PathBuf,

        /// First address (hex with 0x prefix, or decimal).
        #[arg(long, value_parser = parse_addr)]
        start: u32,

        /// Last address, inclusive.
        #[arg(long, value_parser = parse_addr)]
        end: u32,

        /// Output file; prints a hex dump when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn parse_addr(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

/// Prints `msg` and exits with status 1.
fn fatal(msg: impl std::fmt::Display) -> ! {
    eprintln!("[!] {msg}");
    process::exit(1);
}

fn read_file(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| fatal(format!("could not read '{}': {e}", path.display())))
}

fn load_config(path: Option<&Path>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| fatal(format!("could not read '{}': {e}", path.display())));
    Config::from_json(&text)
        .unwrap_or_else(|e| fatal(format!("invalid config '{}': {e}", path.display())))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Imports {
            image,
            policy,
            dlls,
            save_state,
        } => cmd_imports(config, &image, policy, &dlls, save_state.as_deref()),
        Commands::Exports { image } => cmd_exports(&image),
        Commands::Dump {
            image,
            start,
            end,
            out,
        } => cmd_dump(config, &image, start, end, out.as_deref()),
    }
}

/// Maps `image` into a fresh session, faking every DLL.
fn mapped_session(config: Config, image: &Path) -> (Session, LoadedImage) {
    let data = read_file(image);
    let mut session = Session::new(config);
    let loaded = session
        .load_image(&data)
        .unwrap_or_else(|e| fatal(format!("could not load '{}': {e}", image.display())));
    (session, loaded)
}

fn cmd_imports(
    mut config: Config,
    image: &Path,
    policy: Policy,
    dlls: &[String],
    save_state: Option<&Path>,
) {
    let mut host = ImageHost::new();
    for entry in dlls {
        let Some((name, path)) = entry.split_once('=') else {
            fatal(format!("--dll expects NAME=PATH, got '{entry}'"));
        };
        let base = host
            .add_image(name, &read_file(Path::new(path)), false)
            .unwrap_or_else(|e| fatal(format!("could not parse '{path}': {e}")));
        debug!(name, base, "host DLL registered");
    }

    config.modules.load_library = policy.into();
    config.modules.get_module_handle = policy.into();
    let mut session = Session::with_host(
        config,
        Box::new(host),
        Box::new(FixedPrompt(LoadDecision::Fake)),
    );
    let data = read_file(image);
    let loaded = session
        .load_image(&data)
        .unwrap_or_else(|e| fatal(format!("could not load '{}': {e}", image.display())));

    println!(
        "Image base 0x{:08X}  size 0x{:X}  entry 0x{:08X}",
        loaded.mapped.image_base, loaded.mapped.size_of_image, loaded.mapped.entry
    );
    println!(
        "Imports: {} modules, {} thunks patched, {} failed",
        loaded.imports.modules, loaded.imports.patched, loaded.imports.failed
    );
    println!();
    println!("Modules:");
    for m in session.modules.iter() {
        println!("  {:<24} handle {}  id {}", m.name, m.handle, m.id);
    }
    println!();
    println!("Hooks:");
    for hook in session.hooks.iter() {
        println!(
            "  0x{:08X}  {:<32} {}",
            hook.address,
            hook.name,
            if hook.emulated { "emulated" } else { "unemulated" }
        );
    }

    if let Some(path) = save_state {
        fs::write(path, session.save_state())
            .unwrap_or_else(|e| fatal(format!("could not write '{}': {e}", path.display())));
        println!();
        println!("Session state written to {}", path.display());
    }
}

fn cmd_exports(image: &Path) {
    let data = read_file(image);
    let (base, info) = loader::inspect_image(&data)
        .unwrap_or_else(|e| fatal(format!("could not parse '{}': {e}", image.display())));
    let exports = &info.exports;
    println!(
        "Image base 0x{base:08X}  size 0x{:X}  ordinal base {}",
        info.size_of_image, exports.ordinal_base
    );
    for (slot, &rva) in exports.functions.iter().enumerate() {
        if rva == 0 {
            continue;
        }
        let name = exports.name_for_rva(rva).unwrap_or("");
        println!(
            "  {:>5}  0x{:08X}  {name}",
            exports.ordinal_base as usize + slot,
            base.wrapping_add(rva)
        );
    }
}

fn cmd_dump(config: Config, image: &Path, start: u32, end: u32, out: Option<&Path>) {
    let (session, _) = mapped_session(config, image);
    if let Some(path) = out {
        let written = session
            .memory
            .dump_range_to_file(path, start, end)
            .unwrap_or_else(|e| fatal(e));
        println!("Wrote {written} bytes to {}", path.display());
        return;
    }
    let bytes = session.memory.dump_range(start, end).unwrap_or_else(|e| fatal(e));
    for (row, chunk) in (0u32..).zip(bytes.chunks(16)) {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
        println!("0x{:08X}  {}", start.wrapping_add(row * 16), hex.join(" "));
    }
}
