use std::io::{self, Write};

use anyhow::Result;
use colored::Colorize;

fn prefix() -> String {
    "[fuelkvm]".bold().cyan().to_string()
}

/// Print an informational message: [fuelkvm] message
pub fn info(msg: &str) {
    println!("{} {}", prefix(), msg);
}

/// Print a success message: [fuelkvm] message (in green)
pub fn success(msg: &str) {
    println!("{} {}", prefix(), msg.green());
}

/// Print a warning message: [fuelkvm] message (in yellow)
pub fn warn(msg: &str) {
    println!("{} {}", prefix(), msg.yellow());
}

/// Print an error message: [fuelkvm] message (in red)
pub fn error(msg: &str) {
    eprintln!("{} {}", "[fuelkvm]".bold().red(), msg.red());
}

/// Announce a unit of work, run it, and mark the outcome on the same line.
///
/// Prints `label ...` before running `f`, then `ok` or `failed`. The error
/// is propagated unchanged after the mark.
pub fn action<T>(label: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    print!("{} {} ... ", prefix(), label);
    let _ = io::stdout().flush();

    match f() {
        Ok(value) => {
            println!("{}", "ok".green());
            Ok(value)
        }
        Err(err) => {
            println!("{}", "failed".red());
            Err(err)
        }
    }
}
