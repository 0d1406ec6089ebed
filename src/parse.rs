mod numstat;
mod shortstat;

use indexmap::IndexMap;
use memchr::memmem;
use std::fmt;
use std::io::BufRead;

use crate::error::AnalysisError;
use crate::git::{LogFormat, NUMSTAT_SENTINEL};
use crate::model::CommitRecord;

const SHORT_HASH_LEN: usize = 7;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Subjects longer than this many characters are cut and suffixed with `...`.
    pub message_limit: Option<usize>,
    /// Used for headers whose timestamp field does not parse.
    pub fallback_timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTouches(IndexMap<String, u64>);

impl FileTouches {
    pub fn record(&mut self, path: &str) {
        match self.0.get_mut(path) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(path.to_string(), 1);
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.0.get(path).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(path, count)| (path.as_str(), *count))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningReason {
    MalformedHeader,
    BadTimestamp,
    BadCount,
    OrphanLine,
    UnrecognizedLine,
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningReason::MalformedHeader => write!(f, "malformed commit header"),
            WarningReason::BadTimestamp => write!(f, "unparseable timestamp, used parse time"),
            WarningReason::BadCount => write!(f, "unparseable line count"),
            WarningReason::OrphanLine => write!(f, "stat line before any commit header"),
            WarningReason::UnrecognizedLine => write!(f, "unrecognized line"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line: usize,
    pub reason: WarningReason,
}

#[derive(Debug, Default)]
pub struct ParsedLog {
    pub commits: Vec<CommitRecord>,
    pub touches: FileTouches,
    pub warnings: Vec<ParseWarning>,
}

pub fn parse_log(
    raw: &[u8],
    format: LogFormat,
    options: &ParseOptions,
) -> Result<ParsedLog, AnalysisError> {
    let mut parsed = parse_reader(raw, format, options)
        .map_err(|e| AnalysisError::UnreadableLog(e.to_string()))?;
    parsed.commits.shrink_to_fit();
    Ok(parsed)
}

/// Folds log lines into records. Lines that can't be interpreted are
/// skipped with a warning; only a failing reader aborts the parse.
pub fn parse_reader<R: BufRead>(
    mut reader: R,
    format: LogFormat,
    options: &ParseOptions,
) -> std::io::Result<ParsedLog> {
    let mut builder = Builder::new(options);
    let mut buf = Vec::new();
    let mut number = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        number += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }

        match format {
            LogFormat::Shortstat => shortstat::feed(&mut builder, number, line),
            LogFormat::Numstat => numstat::feed(&mut builder, number, line),
        }
    }

    Ok(builder.finish())
}

pub fn estimate_commits(raw: &[u8], format: LogFormat) -> usize {
    match format {
        LogFormat::Numstat => memmem::find_iter(raw, NUMSTAT_SENTINEL.as_bytes()).count(),
        LogFormat::Shortstat => memchr::memchr_iter(b'\n', raw).count() / 3,
    }
}

struct Header<'a> {
    hash: &'a str,
    author: &'a str,
    timestamp: &'a str,
    subject: &'a str,
}

fn split_header(line: &str) -> Option<Header<'_>> {
    let mut parts = line.splitn(4, '|');
    Some(Header {
        hash: parts.next()?,
        author: parts.next()?,
        timestamp: parts.next()?,
        subject: parts.next()?,
    })
}

struct Builder<'a> {
    options: &'a ParseOptions,
    current: Option<CommitRecord>,
    log: ParsedLog,
}

impl<'a> Builder<'a> {
    fn new(options: &'a ParseOptions) -> Self {
        Self {
            options,
            current: None,
            log: ParsedLog::default(),
        }
    }

    fn open(&mut self, line: usize, header: Header<'_>, files_touched: Option<u64>) {
        self.close();

        let timestamp = match header.timestamp.trim().parse::<i64>() {
            Ok(ts) => ts,
            Err(_) => {
                self.warn(line, WarningReason::BadTimestamp);
                self.options.fallback_timestamp
            }
        };

        self.current = Some(CommitRecord {
            hash: header.hash.trim().chars().take(SHORT_HASH_LEN).collect(),
            author: header.author.to_string(),
            timestamp,
            lines_added: 0,
            lines_removed: 0,
            message: truncate_message(header.subject, self.options.message_limit),
            files_touched,
        });
    }

    fn close(&mut self) {
        if let Some(record) = self.current.take() {
            self.log.commits.push(record);
        }
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }

    fn add_lines(&mut self, added: u64, removed: u64) {
        if let Some(record) = self.current.as_mut() {
            record.lines_added += added;
            record.lines_removed += removed;
        }
    }

    fn add_file(&mut self, path: &str, added: u64, removed: u64) {
        if let Some(record) = self.current.as_mut() {
            record.lines_added += added;
            record.lines_removed += removed;
            record.files_touched = Some(record.files_touched.unwrap_or(0) + 1);
            self.log.touches.record(path);
        }
    }

    fn warn(&mut self, line: usize, reason: WarningReason) {
        self.log.warnings.push(ParseWarning { line, reason });
    }

    fn finish(mut self) -> ParsedLog {
        self.close();
        self.log
    }
}

fn truncate_message(subject: &str, limit: Option<usize>) -> String {
    match limit {
        Some(limit) if subject.chars().count() > limit => {
            let mut cut: String = subject.chars().take(limit).collect();
            cut.push_str(ELLIPSIS);
            cut
        }
        _ => subject.to_string(),
    }
}
