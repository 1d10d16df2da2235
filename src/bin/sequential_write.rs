use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use clap::Parser;
use rand::Rng;
use regex::Regex;
use seqwrite::{
    ConsoleObserver, Handoff, SequentialWriter, SyslogObserver, WriteObserver, WriterConfig,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing_subscriber::EnvFilter;

/// Append lines to one file from many threads through a single writer thread.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// File to append to (created if missing)
    #[arg(long, default_value = "output.txt")]
    output: PathBuf,

    /// Number of concurrent producers, one line each
    #[arg(long, default_value_t = 10)]
    lines: usize,

    /// Handoff queue depth; 0 hands each buffer straight to the writer
    #[arg(long, default_value_t = 0)]
    queue: usize,

    /// Each producer sleeps a random 0..=N ms before submitting
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,

    /// Read the file back and check every line afterwards
    #[arg(long)]
    verify: bool,

    /// Also report writes and failures to syslog
    #[arg(long)]
    syslog: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // producers that haven't submitted yet skip their line once this is set
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            eprintln!("Failed to register handler for signal {}: {}", signal, e);
        }
    }

    let mut observers: Vec<Arc<dyn WriteObserver>> = vec![Arc::new(ConsoleObserver)];
    if args.syslog {
        match SyslogObserver::connect("sequential-write") {
            Ok(observer) => observers.push(Arc::new(observer)),
            Err(e) => eprintln!("{}", e),
        }
    }

    let config = WriterConfig::default().handoff(Handoff::from_capacity(args.queue));
    let writer = match SequentialWriter::open_with(&args.output, config) {
        Ok(writer) => writer.with_observers(observers),
        Err(err) => {
            println!("Error creating FileWriter: {}", err);
            return;
        }
    };

    if let Err(err) = writer.start() {
        println!("Error starting FileWriter: {}", err);
        return;
    }

    // write data concurrently
    write_lines(&writer, args.lines, args.jitter_ms, &stop);

    writer.wait_for_pending();
    writer.close();

    let stats = writer.stats();
    if stop.load(Ordering::Relaxed) {
        println!("Interrupted: {} of {} lines submitted", stats.submitted, args.lines);
    }
    if stats.failed > 0 {
        println!("{} of {} writes failed", stats.failed, stats.submitted);
    }

    if args.verify {
        match verify(writer.path()) {
            Ok(report) => println!("Verified {}: {}", writer.path().display(), report),
            Err(e) => eprintln!("Failed to read back {}: {}", writer.path().display(), e),
        }
    }

    println!("FileWriter has completed.");
}

/// One producer thread per line; producers still waiting when `stop` is set skip their line.
fn write_lines(writer: &SequentialWriter, lines: usize, jitter_ms: u64, stop: &AtomicBool) {
    thread::scope(|s| {
        for i in 0..lines {
            s.spawn(move || {
                if jitter_ms > 0 {
                    let delay = rand::thread_rng().gen_range(0..=jitter_ms);
                    thread::sleep(Duration::from_millis(delay));
                }
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                writer.submit(format!("Line {}\n", i));
            });
        }
    });
}

#[derive(Debug, Default, PartialEq, Eq)]
struct VerifyReport {
    lines: usize,
    malformed: usize,
    unterminated: bool,
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lines, {} malformed", self.lines, self.malformed)?;
        if self.unterminated {
            write!(f, ", last line unterminated")?;
        }
        Ok(())
    }
}

fn verify(path: &Path) -> io::Result<VerifyReport> {
    let line_regex = Regex::new(r"^Line \d+$").expect("static regex");
    let contents = fs::read_to_string(path)?;

    Ok(VerifyReport {
        lines: contents.lines().count(),
        malformed: contents
            .lines()
            .filter(|line| !line_regex.is_match(line))
            .count(),
        unterminated: !contents.is_empty() && !contents.ends_with('\n'),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqwrite::WriterState;

    #[test]
    fn verify_counts_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        fs::write(&path, "Line 0\nLine one\nLine 2\ngarbage\n").unwrap();

        let report = verify(&path).unwrap();
        assert_eq!(
            report,
            VerifyReport {
                lines: 4,
                malformed: 2,
                unterminated: false,
            }
        );
        assert_eq!(report.to_string(), "4 lines, 2 malformed");
    }

    #[test]
    fn verify_flags_unterminated_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        fs::write(&path, "Line 0\nLine 1").unwrap();

        let report = verify(&path).unwrap();
        assert_eq!(report.malformed, 0);
        assert!(report.unterminated);
        assert_eq!(report.to_string(), "2 lines, 0 malformed, last line unterminated");
    }

    #[test]
    fn verify_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(verify(&dir.path().join("nope.txt")).is_err());
    }

    fn silent(path: &Path) -> SequentialWriter {
        SequentialWriter::open(path).unwrap().with_observers(Vec::new())
    }

    #[test]
    fn stop_flag_skips_every_pending_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        let writer = silent(&path);
        writer.start().unwrap();

        let stop = AtomicBool::new(true);
        write_lines(&writer, 10, 0, &stop);
        writer.wait_for_pending();
        writer.close();

        assert_eq!(writer.stats().submitted, 0);
        assert_eq!(writer.state(), WriterState::Closed);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn every_line_written_without_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        let writer = silent(&path);
        writer.start().unwrap();

        write_lines(&writer, 10, 2, &AtomicBool::new(false));
        writer.wait_for_pending();
        writer.close();

        let report = verify(&path).unwrap();
        assert_eq!(
            report,
            VerifyReport {
                lines: 10,
                malformed: 0,
                unterminated: false,
            }
        );
    }
}
