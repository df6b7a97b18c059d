fn main() {
    if let Err(err) = repolens::cli::main() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
