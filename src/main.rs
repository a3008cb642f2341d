use clap::Parser;
use log::{error, info};

use rdebuginfo::smap::{LineRemapTable, parse_smap};

/// Command-line arguments parser
#[derive(Parser, Debug)]
#[clap(
    version = "0.1.0",
    about = "Decode SourceDebugExtension (SMAP) payloads and remap output lines"
)]
struct Arguments {
    /// Paths to the SMAP payload files
    #[clap(
        required = true,
        help = "One or more files holding a raw SourceDebugExtension payload.",
        value_name = "FILE",
        value_hint = clap::ValueHint::FilePath
    )]
    files: Vec<String>,

    /// Stratum used for --line queries, defaults to the table's default stratum
    #[clap(long, value_name = "NAME")]
    stratum: Option<String>,

    /// Output line to remap, may be repeated
    #[clap(long = "line", value_name = "N")]
    lines: Vec<u32>,

    /// Print the table in SMAP syntax instead of debug form
    #[clap(long)]
    canonical: bool,
}

fn print_remaps(table: &LineRemapTable, args: &Arguments) {
    let stratum = args.stratum.as_deref().unwrap_or(&table.default_stratum);
    for &line in &args.lines {
        match table.remap_in(stratum, line) {
            Some(remapped) => println!(
                "{}:{} -> {}:{}",
                stratum, line, remapped.file.name, remapped.line
            ),
            None => println!("{}:{} -> unmapped", stratum, line),
        }
    }
}

fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Arguments::parse();
    let mut failed = false;

    for file_path in &args.files {
        info!("Parsing file: {}", file_path);

        let payload = match std::fs::read(file_path) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Error reading {}: {}", file_path, err);
                failed = true;
                continue;
            }
        };

        match parse_smap(&payload) {
            Ok(table) => {
                info!("Parsed {} strata from {}", table.strata.len(), file_path);
                if args.canonical {
                    print!("{}", table);
                } else {
                    println!("{:#?}", table);
                }
                print_remaps(&table, &args);
            }
            Err(err) => {
                error!("Error parsing {}: {}", file_path, err);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
