use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use risc_debug_helper::debug::init_logging;
use risc_debug_helper::error::TransportError;
use risc_debug_helper::firmware::{Firmware, FirmwareImage, MemReader, MemberPath};
use risc_debug_helper::location::CoreLocation;
use risc_debug_helper::risc::sim::SimulatedRisc;
use risc_debug_helper::risc::RiscLoader;
use risc_debug_helper::SessionConfig;

#[derive(Parser, Debug)]
#[command(name = "risc-debug-helper", about = "Inspect RISC firmware images and debug sessions")]
struct Cli {
    /// More logging: -v info, -vv debug with register traces
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Session configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the variables, types and enumerators of a firmware image
    Symbols {
        elf: PathBuf,
        /// Image prefix; defaults to the file stem
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Resolve an access path and print the memory reads it needs
    Access {
        elf: PathBuf,
        path: String,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print the function and source line of a program counter
    DescribePc {
        elf: PathBuf,
        #[arg(value_parser = parse_u64)]
        pc: u64,
    },
    /// Load an image into a simulated core and report its entry point
    DryLoad {
        elf: PathBuf,
        #[arg(long, default_value_t = 0)]
        core: u8,
    },
}

fn parse_u64(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("'{text}' is not a number: {e}"))
}

fn image_prefix(elf: &Path, prefix: Option<String>) -> String {
    prefix.unwrap_or_else(|| {
        elf.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fw".to_string())
    })
}

fn load_single(elf: &Path, prefix: &str, config: &SessionConfig) -> Result<Firmware> {
    let files = BTreeMap::from([(prefix.to_string(), elf.to_path_buf())]);
    Firmware::load(&files, config.extra_vars.as_ref())
        .with_context(|| format!("loading '{}'", elf.display()))
}

fn image<'a>(firmware: &'a Firmware, prefix: &str) -> Result<&'a FirmwareImage> {
    firmware
        .image(prefix)
        .ok_or_else(|| anyhow!("image '{prefix}' was not loaded"))
}

fn print_symbols(image: &FirmwareImage) {
    let types = image.types();
    println!("Variables:");
    for var in image.variables().iter() {
        let type_name = var
            .ty
            .map(|ty| types.display_name(ty))
            .unwrap_or_else(|| "?".to_string());
        match var.address {
            Some(address) => println!(
                "  0x{address:08x} {:>6} {} : {type_name}",
                var.size, var.name
            ),
            None => println!("  {:>17} {} : {type_name}", "-", var.name),
        }
    }
    println!("Types:");
    for (name, &ty) in image.type_names() {
        match types.size_of(ty) {
            Some(size) => println!("  {name} ({size} bytes)"),
            None => println!("  {name}"),
        }
    }
    println!("Enumerators:");
    for (name, value) in image.enumerators() {
        println!("  {name} = {value}");
    }
}

fn print_members(node: &MemberPath, depth: usize) {
    let address = node
        .address
        .map(|a| format!("0x{a:08x}"))
        .unwrap_or_else(|| "?".to_string());
    let size = node
        .size
        .map(|s| s.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!(
        "{:indent$}{} : {} @ {address} ({size} bytes)",
        "",
        node.full_name,
        node.type_name,
        indent = depth * 2
    );
    for child in &node.children {
        print_members(child, depth + 1);
    }
}

fn access(elf: &Path, prefix: &str, path: &str, config: &SessionConfig) -> Result<()> {
    let firmware = load_single(elf, prefix, config)?;
    // Every read is reported and answered with zeros.
    let reader: MemReader<'_> = &|address: u64, size: usize| -> Result<Vec<u8>, TransportError> {
        println!("RD 0x{address:08x} - {size} bytes");
        Ok(vec![0; size])
    };
    let full_path = format!("{prefix}.{path}");
    let (address, size, ty) = firmware.parse_addr_size_type(&full_path, Some(reader))?;
    let image = image(&firmware, prefix)?;
    println!(
        "{full_path}: 0x{address:08x}, {size} bytes, {}",
        image.types().display_name(ty)
    );
    let tree = firmware.get_member_paths(prefix, path, Some(reader))?;
    print_members(&tree, 0);
    Ok(())
}

fn dry_load(elf: &Path, core: u8) -> Result<()> {
    if core >= 4 {
        return Err(anyhow!("core index {core} is out of range"));
    }
    let sim = SimulatedRisc::new();
    let loader = RiscLoader::new(CoreLocation::new(0, 1, 1), core, &sim);
    match loader.load_elf(elf)? {
        Some(init) => {
            let address = u32::try_from(init).context(".init is outside the 32-bit address space")?;
            println!(".init at 0x{init:08x}");
            println!(
                "jump instruction: 0x{:08x}",
                RiscLoader::jump_to_address_instruction(address)
            );
        }
        None => println!("image has no .init section"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    let verbosity = if config.verbose { cli.verbose.max(2) } else { cli.verbose };
    let _logger = init_logging(verbosity)?;

    match cli.command {
        Command::Symbols { elf, prefix } => {
            let prefix = image_prefix(&elf, prefix);
            let firmware = load_single(&elf, &prefix, &config)?;
            print_symbols(image(&firmware, &prefix)?);
        }
        Command::Access { elf, path, prefix } => {
            let prefix = image_prefix(&elf, prefix);
            access(&elf, &prefix, &path, &config)?;
        }
        Command::DescribePc { elf, pc } => {
            let prefix = image_prefix(&elf, None);
            let firmware = load_single(&elf, &prefix, &config)?;
            println!("{}", image(&firmware, &prefix)?.describe_pc(pc));
        }
        Command::DryLoad { elf, core } => dry_load(&elf, core)?,
    }
    Ok(())
}
