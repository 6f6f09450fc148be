// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

mod capture;
mod cli;
mod util;

fn main() {
    let opts: cli::Opts = argh::from_env();
    if opts.version() {
        println!("Kacamata {}", util::get_version());
        return;
    }

    util::init_logging(opts.verbose(), opts.log_file());
    log_panics::init();

    match cli::run(opts) {
        Ok(summary) => println!("{summary}"),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
