fn main() {
    if let Err(err) = ev_session::app::run() {
        eprintln!("ev_session failed: {err}");
        std::process::exit(1);
    }
}
