use std::process;

use clap::Parser;

use scriptserve::cli::Options;
use scriptserve::logging;

fn main() {
    logging::install_panic_hook();

    let options = Options::parse();
    logging::init_logging(options.global.verbosity, options.global.color);

    if let Err(err) = options.run() {
        log::error!("{err:?}");
        process::exit(1);
    }
}
