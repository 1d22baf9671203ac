#![forbid(unsafe_code)]

fn main() {
    dashgrid_cli::logging::init();
    if let Err(error) = dashgrid_cli::run_from_env() {
        eprintln!("dashgrid: {error}");
        std::process::exit(error.exit_code());
    }
}
