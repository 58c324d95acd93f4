//! bnet - discrete Bayes-net command line.

use clap::Parser;

use bn_core::cli::{run, Cli};
use bn_core::logging::{init_logging, level_for_verbosity};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, level_for_verbosity(cli.verbose));
    let code = run(&cli);
    std::process::exit(code.as_i32());
}
