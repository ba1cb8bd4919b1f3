fn main() {
    if let Err(err) = csv_warehouse::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
