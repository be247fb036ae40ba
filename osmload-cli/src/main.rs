//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = osmload_cli::run() {
        eprintln!("osmload: {err}");
        std::process::exit(1);
    }
}
