//! Replays an OctoPrint `serial.log` through a running monitor.
//!
//! ```text
//! 2024-03-02 14:10:07,512 - Send: N2204 T2*91
//! 2024-03-02 14:10:07,530 - Recv: MMU2:<T2 P5*3c
//! 2024-03-02 14:15:41,002 - Changing monitoring state from "Operational" to "Offline"
//! ```

use std::collections::HashSet;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::interceptor::CommandDecision;
use crate::monitor::{Lifecycle, MonitorError};
use crate::service::MonitorHandle;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";
const STATE_CHANGE: &str = "Changing monitoring state from ";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: bad timestamp '{text}': {source}")]
    Timestamp {
        line: usize,
        text: String,
        source: chrono::ParseError,
    },
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Recv(String),
    Send(String),
    Lifecycle(Lifecycle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub entry: LogEntry,
}

/// Counters reported at the end of a replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub received: usize,
    pub sent: usize,
    pub rewritten: usize,
    pub suppressed: usize,
    pub skipped: usize,
}

/// Removes the `N<n> ` line number and `*<checksum>` OctoPrint adds to
/// sent commands.
pub fn strip_sent(command: &str) -> &str {
    let mut command = command.trim();
    if let Some(rest) = command.strip_prefix('N') {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 && rest[digits..].starts_with(' ') {
            command = rest[digits..].trim_start();
        }
    }
    match command.rfind('*') {
        Some(star) if command[star + 1..].chars().all(|c| c.is_ascii_digit()) => command[..star].trim_end(),
        _ => command,
    }
}

fn lifecycle_of(message: &str) -> Option<Lifecycle> {
    let change = message.strip_prefix(STATE_CHANGE)?;
    let (from, to) = change.split_once(" to ")?;
    let (from, to) = (from.trim_matches('"'), to.trim_matches('"'));
    match to {
        "Offline" | "Closed" => Some(Lifecycle::Disconnected),
        "Printing" if from == "Starting" => Some(Lifecycle::PrintStarted),
        "Finishing" => Some(Lifecycle::PrintDone),
        "Cancelling" => Some(Lifecycle::PrintCancelled),
        _ if to.starts_with("Offline after error") || to.starts_with("Error") => Some(Lifecycle::PrintFailed),
        _ => None,
    }
}

/// Parses one log line. Lines that carry nothing for the monitor yield
/// `Ok(None)`.
pub fn parse_line(number: usize, line: &str) -> Result<Option<LogRecord>, ReplayError> {
    let Some((stamp, message)) = line.split_once(" - ") else {
        return Ok(None);
    };
    let timestamp = NaiveDateTime::parse_from_str(stamp.trim(), TIMESTAMP_FORMAT).map_err(|source| {
        ReplayError::Timestamp {
            line: number,
            text: stamp.to_string(),
            source,
        }
    })?;
    let entry = if let Some(received) = message.strip_prefix("Recv: ") {
        LogEntry::Recv(received.trim_end().to_string())
    } else if let Some(sent) = message.strip_prefix("Send: ") {
        LogEntry::Send(strip_sent(sent).to_string())
    } else if let Some(event) = lifecycle_of(message.trim_end()) {
        LogEntry::Lifecycle(event)
    } else {
        return Ok(None);
    };
    Ok(Some(LogRecord { timestamp, entry }))
}

/// Parses a whole log, skipping (and logging) lines with bad timestamps.
pub fn parse_log(contents: &str) -> (Vec<LogRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0;
    for (index, line) in contents.lines().enumerate() {
        match parse_line(index + 1, line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping log line: {}", e);
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

/// Feeds records to the monitor as a host would: received lines as they
/// come, sent commands through the interceptor first.
pub async fn replay(handle: &MonitorHandle, records: &[LogRecord]) -> Result<ReplayStats, ReplayError> {
    let mut stats = ReplayStats::default();
    let no_tags = HashSet::new();
    for record in records {
        match &record.entry {
            LogEntry::Recv(line) => {
                stats.received += 1;
                handle.line_received(line.as_str()).await?;
            }
            LogEntry::Send(command) => {
                stats.sent += 1;
                match handle.command_queued(command.as_str(), no_tags.clone()).await? {
                    CommandDecision::PassThrough => handle.command_sent(command.as_str()).await?,
                    CommandDecision::Suppress => stats.suppressed += 1,
                    CommandDecision::Rewrite(commands) => {
                        stats.rewritten += 1;
                        for command in commands {
                            handle.command_sent(command).await?;
                        }
                    }
                }
            }
            LogEntry::Lifecycle(event) => {
                tracing::debug!("{} {:?}", record.timestamp, event);
                handle.lifecycle(*event).await?;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sent() {
        assert_eq!(strip_sent("N2204 T2*91"), "T2");
        assert_eq!(strip_sent("M109 S215"), "M109 S215");
        assert_eq!(strip_sent("N12 M109 S215*7"), "M109 S215");
        assert_eq!(strip_sent("Tx"), "Tx");
        assert_eq!(strip_sent("NOT_A_LINE_NUMBER"), "NOT_A_LINE_NUMBER");
    }

    #[test]
    fn test_parse_recv_and_send() {
        let record = parse_line(1, "2024-03-02 14:10:07,530 - Recv: MMU2:<T2 P5*3c")
            .unwrap()
            .unwrap();
        assert_eq!(record.entry, LogEntry::Recv("MMU2:<T2 P5*3c".to_string()));
        assert_eq!(record.timestamp.format("%H:%M:%S%.3f").to_string(), "14:10:07.530");

        let record = parse_line(2, "2024-03-02 14:10:07,512 - Send: N2204 T2*91").unwrap().unwrap();
        assert_eq!(record.entry, LogEntry::Send("T2".to_string()));
    }

    #[test]
    fn test_parse_state_changes() {
        let line = r#"2024-03-02 14:15:41,002 - Changing monitoring state from "Operational" to "Offline""#;
        let record = parse_line(1, line).unwrap().unwrap();
        assert_eq!(record.entry, LogEntry::Lifecycle(Lifecycle::Disconnected));

        let line = r#"2024-03-02 14:00:00,000 - Changing monitoring state from "Starting" to "Printing""#;
        let record = parse_line(1, line).unwrap().unwrap();
        assert_eq!(record.entry, LogEntry::Lifecycle(Lifecycle::PrintStarted));

        let line = r#"2024-03-02 14:00:00,000 - Changing monitoring state from "Paused" to "Printing""#;
        assert_eq!(parse_line(1, line).unwrap(), None);
    }

    #[test]
    fn test_parse_log_skips_noise() {
        let log = "----- Serial log started -----\n\
                   2024-03-02 14:10:07,530 - Recv: ok\n\
                   2024-03-02 14:10:07,531 - Enabling serial logging\n\
                   yesterday - Recv: ok\n";
        let (records, skipped) = parse_log(log);
        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 1);
    }
}
