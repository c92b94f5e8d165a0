use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BuildResult, DiscoverResult, ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::store::WriteSummary;
use crate::tables::LookupTables;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_discover(result: &DiscoverResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tables(tables: &LookupTables) -> io::Result<()> {
        Self::print_json(tables)
    }

    pub fn print_written(summary: &WriteSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints progress lines to stderr for interactive runs.
pub struct ConsoleSink {
    kind: ProgressSinkKind,
}

impl ConsoleSink {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self { kind }
    }
}

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        let label = match self.kind {
            ProgressSinkKind::Build => "plan",
            ProgressSinkKind::Discover => "discover",
        };
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "[{label}] {} ({} ms)",
                event.message,
                elapsed.as_millis()
            ),
            None => eprintln!("[{label}] {}", event.message),
        }
    }
}
