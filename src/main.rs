fn main() {
    if let Err(err) = axenote::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
