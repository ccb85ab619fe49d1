//! indexctl - period index inspection tool
//!
//! Prints the contents of an index database as JSON.

use period_indexer::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
