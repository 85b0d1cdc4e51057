fn main() {
    if let Err(err) = glucocast_lib::run() {
        log::error!("glucocast exited with error: {err:#}");
        eprintln!("glucocast: {err:#}");
        std::process::exit(1);
    }
}
