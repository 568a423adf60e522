//! Append-only CSV log of reconciliation results.
//!
//! A single writer thread owns the file. Workers hand rows over a bounded
//! channel tagged with their input index; the writer holds early arrivals
//! back until every earlier row has been written, so the file is always in
//! input order no matter how the worker pool interleaves.
//!
//! Layout (semicolon-delimited, every field quoted):
//!
//! ```text
//! "TRACK STATE";"LOCAL NAME";"BEST CANDIDATE";"COMPARE RATIO"
//! "Success";"queen bohemian rhapsody";"queen bohemian rhapsody";"1.00"
//! ""
//! "STATISTICS"
//! "Number of tracks processed";"2"
//! ...
//! ```

use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use crate::models::{LogStatus, ReconciledTrack, ReconciliationSummary};

/// Bounded capacity of the row channel
const LOG_QUEUE: usize = 1024;

const HEADER: [&str; 4] = ["TRACK STATE", "LOCAL NAME", "BEST CANDIDATE", "COMPARE RATIO"];

#[derive(Debug, Clone)]
struct LogRow {
    status: LogStatus,
    local_name: String,
    candidate: String,
    ratio: Option<f64>,
}

enum LogMessage {
    /// `row` is None for items that are not logged (cancelled)
    Row { index: usize, row: Option<LogRow> },
    Finish(Box<LogTrailer>),
}

struct LogTrailer {
    summary: ReconciliationSummary,
    playlist: Option<Vec<String>>,
}

/// Handle to the writer thread.
pub struct MatchLog {
    tx: Sender<LogMessage>,
    writer: JoinHandle<io::Result<()>>,
}

/// Cloneable sending side handed to the engine.
#[derive(Clone)]
pub struct LogSender {
    tx: Sender<LogMessage>,
}

impl LogSender {
    pub fn record(&self, record: &ReconciledTrack) {
        let row = record.outcome.log_status().map(|status| LogRow {
            status,
            local_name: record.name.normalized.clone(),
            candidate: record.outcome.best_label().unwrap_or_default().to_string(),
            ratio: record.outcome.score(),
        });
        // A dead writer reports its error from `MatchLog::finish`
        let _ = self.tx.send(LogMessage::Row {
            index: record.index,
            row,
        });
    }
}

impl MatchLog {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer<W: Write + Send + 'static>(out: W) -> Self {
        let (tx, rx) = bounded::<LogMessage>(LOG_QUEUE);
        let writer = thread::spawn(move || writer_loop(out, rx));
        Self { tx, writer }
    }

    pub fn sender(&self) -> LogSender {
        LogSender {
            tx: self.tx.clone(),
        }
    }

    /// Write the statistics block (and the playlist block when a playlist
    /// step ran), then wait for the writer to flush and exit.
    pub fn finish(
        self,
        summary: &ReconciliationSummary,
        playlist: Option<&[String]>,
    ) -> io::Result<()> {
        let trailer = LogTrailer {
            summary: summary.clone(),
            playlist: playlist.map(|p| p.to_vec()),
        };
        let _ = self.tx.send(LogMessage::Finish(Box::new(trailer)));
        drop(self.tx);
        match self.writer.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("match log writer thread panicked")),
        }
    }
}

fn writer_loop<W: Write>(mut out: W, rx: Receiver<LogMessage>) -> io::Result<()> {
    write_record(&mut out, &HEADER)?;

    let mut pending: BTreeMap<usize, Option<LogRow>> = BTreeMap::new();
    let mut next = 0usize;

    while let Ok(message) = rx.recv() {
        match message {
            LogMessage::Row { index, row } => {
                pending.insert(index, row);
                while let Some(row) = pending.remove(&next) {
                    if let Some(row) = row {
                        write_row(&mut out, &row)?;
                    }
                    next += 1;
                }
            }
            LogMessage::Finish(trailer) => {
                // Rows after a gap (never sent) still go out, in index order
                for row in std::mem::take(&mut pending).into_values().flatten() {
                    write_row(&mut out, &row)?;
                }
                write_trailer(&mut out, &trailer)?;
                break;
            }
        }
    }

    for row in pending.into_values().flatten() {
        write_row(&mut out, &row)?;
    }
    out.flush()
}

fn write_row<W: Write>(out: &mut W, row: &LogRow) -> io::Result<()> {
    let ratio = row.ratio.map(|r| format!("{:.2}", r)).unwrap_or_default();
    write_record(
        out,
        &[row.status.as_str(), &row.local_name, &row.candidate, &ratio],
    )
}

fn write_trailer<W: Write>(out: &mut W, trailer: &LogTrailer) -> io::Result<()> {
    let s = &trailer.summary;
    let playlist_rate = s
        .playlist_success_rate()
        .map(|r| format!("{:.2}", r))
        .unwrap_or_else(|| "n/a".to_string());

    write_record(out, &["", "", "", ""])?;
    write_record(out, &["STATISTICS"])?;
    write_record(out, &["Number of tracks processed", &s.total.to_string()])?;
    write_record(out, &["Successfully found tracks", &s.matched.to_string()])?;
    write_record(out, &["Not identical tracks", &s.not_identical.to_string()])?;
    write_record(out, &["Amount of zero found results", &s.zero_found.to_string()])?;
    write_record(out, &["Success rate Search", &format!("{:.2}", s.search_success_rate())])?;
    write_record(out, &["Success rate Playlist", &playlist_rate])?;

    if let Some(entries) = &trailer.playlist {
        write_record(out, &["", "", "", ""])?;
        write_record(out, &["TRACKS IN PLAYLIST"])?;
        for entry in entries {
            write_record(out, &[entry.as_str()])?;
        }
    }
    Ok(())
}

fn write_record<W: Write>(out: &mut W, fields: &[&str]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(";");
    writeln!(out, "{}", line)
}
