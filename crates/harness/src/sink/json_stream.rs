//! NDJSON (newline-delimited JSON) stream sink.
//!
//! Each row is serialized straight into the buffered writer.
//!
//! ```ignore
//! let mut sink = JsonStreamSink::stdout();
//! sink.write_summary(&summary)?;
//! sink.write_outcomes(&rows)?;
//! sink.finish()?;
//! ```

use super::{OutcomeRow, RunSummaryRow};
use serde::Serialize;
use std::io::{self, BufWriter, Write};

/// Buffered NDJSON writer.
pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
    rows_written: usize,
}

impl JsonStreamSink<io::Stdout> {
    /// Write NDJSON to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonStreamSink<W> {
    /// Create a sink wrapping any writer (file, Vec<u8>, etc.).
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows_written: 0,
        }
    }

    /// Write one run summary row.
    pub fn write_summary(&mut self, row: &RunSummaryRow) -> io::Result<()> {
        self.write_row(row)
    }

    /// Write all outcome rows.
    pub fn write_outcomes(&mut self, rows: &[OutcomeRow]) -> io::Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Flush and return how many rows were written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    /// Number of rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    fn write_row<T: Serialize>(&mut self, row: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }
}
