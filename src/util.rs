// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn init_logging(verbose: bool, log_file: Option<&str>) {
    use simplelog::*;

    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let log_config = ConfigBuilder::new()
        .add_filter_ignore_str("indicatif")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(level, log_config.clone(), TerminalMode::Mixed, ColorChoice::Auto)
    ];
    if let Some(path) = log_file {
        match std::fs::File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, log_config, file)),
            Err(e) => eprintln!("Failed to create log file {path}: {e:?}")
        }
    }
    let _ = CombinedLogger::init(loggers);
}

/// "1920x1080" -> (1920, 1080)
pub fn parse_size(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s.split_once(['x', 'X']).ok_or_else(|| format!("Invalid size {s:?}, expected WxH"))?;
    let w = w.trim().parse::<usize>().map_err(|e| format!("Invalid width in {s:?}: {e}"))?;
    let h = h.trim().parse::<usize>().map_err(|e| format!("Invalid height in {s:?}: {e}"))?;
    if w == 0 || h == 0 {
        return Err(format!("Invalid size {s:?}"));
    }
    Ok((w, h))
}
