//! Hooks that see every write attempt the worker makes.
//!
//! A failed write never reaches the producer that submitted it, so these are
//! the only place a failure shows up besides [`WriterStats::failed`](crate::WriterStats).

use std::{
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use syslog::{Facility, Formatter3164, Logger, LoggerBackend};

use crate::error::{Result, WriteFailure, WriterError};

pub trait WriteObserver: Send + Sync {
    /// Called by the worker right before `data` is written.
    fn on_write(&self, data: &[u8]);

    /// Called when writing or flushing `data` failed.
    fn on_failure(&self, data: &[u8], failure: &WriteFailure);
}

/// Prints `Write <bytes>` for every attempt and an error line for every failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl ConsoleObserver {
    fn write_line(out: &mut impl Write, data: &[u8]) -> io::Result<()> {
        out.write_all(b"Write ")?;
        out.write_all(data)?;
        out.flush()
    }
}

impl WriteObserver for ConsoleObserver {
    fn on_write(&self, data: &[u8]) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = Self::write_line(&mut out, data) {
            tracing::debug!(error = %e, "stdout unavailable");
        }
    }

    fn on_failure(&self, _data: &[u8], failure: &WriteFailure) {
        println!("{failure}");
    }
}

/// Forwards write notices and failures to the local syslog daemon.
pub struct SyslogObserver {
    logger: Mutex<Logger<LoggerBackend, Formatter3164>>,
}

impl SyslogObserver {
    pub fn connect(process: &str) -> Result<Self> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_USER,
            hostname: None,
            process: process.into(),
            pid: std::process::id(),
        };

        let logger = syslog::unix(formatter).map_err(|e| WriterError::Syslog(e.to_string()))?;
        Ok(Self {
            logger: Mutex::new(logger),
        })
    }
}

impl WriteObserver for SyslogObserver {
    fn on_write(&self, data: &[u8]) {
        let line = String::from_utf8_lossy(data);
        let mut logger = self.logger.lock().unwrap_or_else(PoisonError::into_inner);
        logger
            .info(format!("write {} bytes: {}", data.len(), line.trim_end()))
            .unwrap_or_else(|e| eprintln!("Failed to send to syslog: {}", e));
    }

    fn on_failure(&self, data: &[u8], failure: &WriteFailure) {
        let mut logger = self.logger.lock().unwrap_or_else(PoisonError::into_inner);
        logger
            .err(format!(
                "{} failed for {} bytes: {}",
                failure.stage(),
                data.len(),
                failure.io_error()
            ))
            .unwrap_or_else(|e| eprintln!("Failed to send to syslog: {}", e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_line_is_prefix_plus_raw_bytes() {
        let mut out = Vec::new();
        ConsoleObserver::write_line(&mut out, b"Line 3\n").unwrap();
        assert_eq!(out, b"Write Line 3\n");
    }

    #[test]
    fn console_line_keeps_embedded_newlines() {
        let mut out = Vec::new();
        ConsoleObserver::write_line(&mut out, b"a\nb").unwrap();
        assert_eq!(out, b"Write a\nb");
    }
}
