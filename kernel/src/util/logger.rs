// =============================================================================
// kthreads — Kernel Logger
// =============================================================================
//
// The core logs through the `log` facade (`info!`, `warn!`, ...). This module
// is the backend: a `log::Log` implementation that formats each record as
//
//   <color>[LEVEL]<reset> message
//
// and hands the finished text to a sink installed by the embedding kernel
// (serial port, framebuffer console, a test buffer).
//
// USAGE:
//   fn serial_write(s: &str) { /* ... */ }
//   kthreads::util::logger::init(serial_write, cpu, log::LevelFilter::Info);
//
// Until `init` runs every record is discarded, so the core can log from the
// very first call without caring whether output exists yet.
//
// THREAD SAFETY:
//   Interrupts are masked and the output lock is held for the whole record.
//   Nothing can preempt a writer halfway through, so records never
//   interleave and an interrupt handler never finds the lock taken.
// =============================================================================

use alloc::sync::Arc;
use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::arch::Cpu;
use crate::sync::InterruptGuard;

/// Where formatted log text goes.
pub type Sink = fn(&str);

struct Backend {
    sink: Sink,
    cpu: Arc<dyn Cpu>,
}

struct KernelLogger {
    backend: spin::Once<Backend>,
    out: spin::Mutex<()>,
}

static LOGGER: KernelLogger = KernelLogger::new();

/// Installs `sink` as the log backend and sets the maximum level.
///
/// `cpu` masks interrupts while a record is written.
pub fn init(sink: Sink, cpu: Arc<dyn Cpu>, max_level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.install(sink, cpu);
    log::set_logger(&LOGGER)?;
    log::set_max_level(max_level);
    Ok(())
}

/// Terminal label for `level`, padded to a common width.
pub fn level_label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

/// ANSI color for `level`.
pub fn level_color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

/// Writes one formatted record, newline included.
pub fn format_record(out: &mut impl Write, record: &Record<'_>) -> fmt::Result {
    let level = record.level();
    writeln!(
        out,
        "{}[{}]\x1b[0m {}",
        level_color(level),
        level_label(level),
        record.args()
    )
}

/// Adapts the sink to `fmt::Write` so records format without allocating.
struct SinkWriter(Sink);

impl Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        (self.0)(s);
        Ok(())
    }
}

impl KernelLogger {
    const fn new() -> Self {
        Self {
            backend: spin::Once::new(),
            out: spin::Mutex::new(()),
        }
    }

    fn install(&self, sink: Sink, cpu: Arc<dyn Cpu>) {
        self.backend.call_once(|| Backend { sink, cpu });
    }

    /// Writes `record` with interrupts off and the output lock held.
    fn write(&self, record: &Record<'_>) {
        if let Some(backend) = self.backend.get() {
            let _irq = InterruptGuard::new(&*backend.cpu);
            let _out = self.out.lock();
            let _ = format_record(&mut SinkWriter(backend.sink), record);
        }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write(record);
    }

    fn flush(&self) {}
}
