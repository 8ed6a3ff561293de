use log::{LevelFilter, Log, Metadata, Record};

/// Log levels selectable from the command line. `Trace` enables everything
/// the core emits; `Regs` keeps it to register/state debug lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogChoice {
    Trace,
    Regs,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

pub fn init(choice: Option<LogChoice>) {
    let filter = match choice {
        Some(LogChoice::Trace) => LevelFilter::Trace,
        Some(LogChoice::Regs) => LevelFilter::Debug,
        None => LevelFilter::Warn,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(filter);
    }
}

/// Cycle the level at runtime (bound to a hotkey, like the original
/// log-level toggle).
pub fn cycle_level() {
    let next = match log::max_level() {
        LevelFilter::Warn => LevelFilter::Debug,
        LevelFilter::Debug => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    };
    log::set_max_level(next);
    eprintln!("log level now {next}");
}
