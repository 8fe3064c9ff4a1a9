//! Report serialization in JSON or JSON Lines.

use serde::Serialize;
use std::io::{self, Write};

use crate::types::BatchReport;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// The whole report as one JSON document
    Json,
    /// One job result per line (newline-delimited JSON)
    JsonLines,
}

/// Serializes batch reports to a writer.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects the JSON format; JSONL is always one object per line.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            items_written: 0,
        }
    }

    /// Write a report.
    ///
    /// JSON writes the report object (results and stats); JSONL writes one
    /// line per job result and leaves the stats out.
    pub fn write_report(&mut self, report: &BatchReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => self.write_json(report),
            OutputFormat::JsonLines => {
                for result in &report.results {
                    serde_json::to_writer(&mut self.writer, result).map_err(io::Error::other)?;
                    writeln!(self.writer)?;
                    self.items_written += 1;
                }
                Ok(())
            }
        }
    }

    fn write_json<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        self.items_written += 1;
        Ok(())
    }

    /// Get the number of JSON documents written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
