fn main() {
    if let Err(err) = ev_session::app::run_sandbox() {
        eprintln!("sandbox startup failed: {err}");
        std::process::exit(1);
    }
}
