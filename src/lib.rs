//! Append byte buffers from many threads to one file through a single writer thread.
//!
//! ```no_run
//! use seqwrite::SequentialWriter;
//!
//! let writer = SequentialWriter::open("output.txt")?;
//! writer.start()?;
//!
//! std::thread::scope(|s| {
//!     for i in 0..10 {
//!         let writer = &writer;
//!         s.spawn(move || writer.submit(format!("Line {i}\n")));
//!     }
//! });
//!
//! writer.wait_for_pending();
//! writer.close();
//! # Ok::<(), seqwrite::WriterError>(())
//! ```

pub mod config;
pub mod destination;
pub mod error;
pub mod observer;
pub mod pending;
pub mod writer;

pub use config::{Handoff, StartPolicy, WriterConfig};
pub use error::{Result, WriteFailure, WriterError};
pub use observer::{ConsoleObserver, SyslogObserver, WriteObserver};
pub use pending::PendingCounter;
pub use writer::{SequentialWriter, Submission, WriterState, WriterStats};
