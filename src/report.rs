//! Result sinks: consumers of the pipeline's result stream.

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;
use crate::pipeline::{NotificationResult, ResultStream};

const DELETED_MARK: &str = "❌";
const READ_MARK: &str = "👓";
const CLOSED_MARK: &str = "✅";
const BOT_MARK: &str = "🤖";

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One line per notification with tags, then a summary.
    Lines,
    /// Tab-separated table, for piping.
    Table,
}

/// Running totals, updated as results are pulled from the stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunTally {
    pub processed: usize,
    pub deleted: usize,
    pub bot: usize,
    pub closed: usize,
    pub read: usize,
}

impl RunTally {
    pub fn record(&mut self, result: &NotificationResult) {
        self.processed += 1;
        self.deleted += usize::from(result.was_deleted);
        self.bot += usize::from(result.is_bot_authored);
        self.closed += usize::from(result.is_closed_pr);
        self.read += usize::from(result.was_read);
    }
}

pub trait ResultSink {
    fn start(&mut self, total: usize) -> std::io::Result<()>;
    fn record(&mut self, result: &NotificationResult) -> std::io::Result<()>;
    fn finish(&mut self, tally: &RunTally) -> std::io::Result<()>;
}

/// Pull every result into `sink`, then surface the run's outcome.
pub async fn consume<S: ResultSink + ?Sized>(
    stream: &mut ResultStream,
    sink: &mut S,
) -> Result<RunTally> {
    let mut tally = RunTally::default();
    sink.start(stream.total())?;

    while let Some(result) = stream.next().await {
        tally.record(&result);
        if let Err(e) = sink.record(&result) {
            // Stop deleting once results can no longer be shown
            if let Err(run_error) = stream.finish().await {
                tracing::error!(error = %run_error, "Run also failed");
            }
            return Err(e.into());
        }
    }

    stream.finish().await?;
    sink.finish(&tally)?;
    Ok(tally)
}

/// Tab-separated output, one row per notification.
pub struct TableSink<W: Write> {
    out: W,
}

impl<W: Write> TableSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ResultSink for TableSink<W> {
    fn start(&mut self, _total: usize) -> std::io::Result<()> {
        writeln!(self.out, "Time                \tReason [Repo] Title")
    }

    fn record(&mut self, result: &NotificationResult) -> std::io::Result<()> {
        let marks: String = [
            (result.was_deleted, DELETED_MARK),
            (result.was_read, READ_MARK),
            (result.is_closed_pr, CLOSED_MARK),
            (result.is_bot_authored, BOT_MARK),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, mark)| *mark)
        .collect();
        let reason = if marks.is_empty() {
            marks
        } else {
            format!("{marks} ")
        };

        let n = &result.notification;
        writeln!(
            self.out,
            "{}\t{}[{}] {}",
            n.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            reason,
            n.repository,
            n.subject.title
        )
    }

    fn finish(&mut self, _tally: &RunTally) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// Human-oriented output: a line per notification and a closing summary.
pub struct LineSink<W: Write> {
    out: W,
    dry_run: bool,
    now: DateTime<Utc>,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W, dry_run: bool, now: DateTime<Utc>) -> Self {
        Self { out, dry_run, now }
    }
}

impl<W: Write> ResultSink for LineSink<W> {
    fn start(&mut self, total: usize) -> std::io::Result<()> {
        writeln!(self.out, "Loaded {total} notifications")
    }

    fn record(&mut self, result: &NotificationResult) -> std::io::Result<()> {
        let n = &result.notification;
        let action = if result.was_deleted { "✗" } else { "✓" };

        let mut line = format!("{action} {} in {}", n.subject.title, n.repository);
        if let Some(pr) = &result.pull_request {
            line.push_str(&format!(" by {}", pr.author_login));
        }
        line.push(' ');
        line.push_str(&relative_age(n.updated_at, self.now));

        for (set, tag) in [
            (result.is_bot_authored, "bot"),
            (result.is_closed_pr, "closed"),
            (result.was_read, "read"),
        ] {
            if set {
                line.push_str(&format!(" [{tag}]"));
            }
        }

        writeln!(self.out, "{line}")
    }

    fn finish(&mut self, tally: &RunTally) -> std::io::Result<()> {
        let verb = if self.dry_run { "would flush" } else { "flushed" };
        writeln!(
            self.out,
            "Done! Processed {} notifications, {verb} {}",
            tally.processed, tally.deleted
        )?;
        self.out.flush()
    }
}

/// Coarse "N units ago" rendering of a timestamp.
pub fn relative_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }
    if seconds < 60 {
        return "just now".to_string();
    }

    const UNITS: [(i64, &str); 6] = [
        (365 * 24 * 3600, "year"),
        (30 * 24 * 3600, "month"),
        (7 * 24 * 3600, "week"),
        (24 * 3600, "day"),
        (3600, "hour"),
        (60, "minute"),
    ];

    let (size, unit) = UNITS
        .iter()
        .copied()
        .find(|(size, _)| seconds >= *size)
        .unwrap_or((60, "minute"));
    let count = seconds / size;
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural} ago")
}
