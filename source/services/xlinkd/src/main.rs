//! CONTEXT: xlinkd entrypoint wiring logging and the command front-end

fn main() {
    env_logger::init();
    if let Err(err) = xlinkd::run() {
        eprintln!("xlinkd: {err}");
        std::process::exit(1);
    }
}
