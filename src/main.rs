use std::env;
use tablog::{run_many_or_exit, MemDatabase};

fn usage(exe: &str) {
    eprintln!(
        "usage: {exe} [FILE ...]
Load and execute Datalog files in order against a shared in-memory database,
printing the answers of every query to standard output.

Options:
  -h, --help    Show this help message"
    );
}

fn main() {
    let exe = env::args().next().unwrap_or_else(|| "tablog".into());
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        usage(&exe);
        std::process::exit(if args.is_empty() { 2 } else { 0 });
    }

    let db = MemDatabase::new();
    run_many_or_exit(&db, &args);
}
