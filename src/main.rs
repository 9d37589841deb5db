fn main() {
    if let Err(error) = empire_dashboard_lib::run() {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}
