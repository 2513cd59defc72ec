use crate::qemu_trace;
use core::fmt;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Secondary text output a loader can mirror log records to.
pub trait Console: Send + Sync {
    /// Write one already formatted line, without the trailing newline.
    fn write_line(&self, args: fmt::Arguments<'_>);
}

/// No secondary output; records only go to the debug port.
impl Console for () {
    fn write_line(&self, _: fmt::Arguments<'_>) {}
}

/// `log` backend writing `[LEVEL] target: message` lines to the QEMU debug
/// port and to a loader-specific [`Console`].
pub struct QemuLogger<C: Console = ()> {
    max_level: LevelFilter,
    console: C,
}

impl<C: Console> QemuLogger<C> {
    #[must_use]
    pub const fn new(max_level: LevelFilter, console: C) -> Self {
        Self { max_level, console }
    }

    /// Call this once during early init.
    #[allow(clippy::missing_errors_doc)]
    pub fn init(&'static self) -> Result<(), SetLoggerError>
    where
        C: 'static,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    pub const fn console(&self) -> &C {
        &self.console
    }
}

impl<C: Console> Log for QemuLogger<C> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        qemu_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );

        self.console.write_line(format_args!(
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {
        // no-op for qemu debug port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::string::String;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Console for Capture {
        fn write_line(&self, args: fmt::Arguments<'_>) {
            self.0.lock().unwrap().push(args.to_string());
        }
    }

    #[test]
    fn mirrors_formatted_records() {
        let logger = QemuLogger::new(LevelFilter::Info, Capture::default());
        logger.log(
            &Record::builder()
                .level(Level::Info)
                .target("iso9660")
                .args(format_args!("mounted {}", "AMBEROS"))
                .build(),
        );
        let lines = logger.console().0.lock().unwrap();
        assert_eq!(lines.as_slice(), ["[INFO] iso9660: mounted AMBEROS"]);
    }

    #[test]
    fn drops_records_above_max_level() {
        let logger = QemuLogger::new(LevelFilter::Warn, Capture::default());
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("elf")
                .args(format_args!("segment"))
                .build(),
        );
        assert!(logger.console().0.lock().unwrap().is_empty());
    }
}
