fn main() {
    if let Err(error) = pulse_monitor_lib::run() {
        eprintln!("pulse-monitor: {error}");
        std::process::exit(1);
    }
}
