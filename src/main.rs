//! Parser driver: compiles a script and prints its instruction listing.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use candela::parser::load;

#[derive(Parser)]
#[command(name = "candela")]
#[command(about = "Compile a lamp script and print the instruction listing")]
struct Args {
    /// Name of the script file.
    file: PathBuf,

    /// Disable the peephole optimizer.
    #[arg(short, long)]
    unoptimized: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    match load(&args.file, !args.unoptimized) {
        Ok(program) => {
            for (addr, inst) in program.code.iter().enumerate() {
                println!("{:4}  {}", addr, inst);
            }
        }
        Err(e) => {
            eprintln!("Error parsing: {}", e);
            process::exit(1);
        }
    }
}
