//! Run identifiers: `<tag>_<YYYY_MM_DD>_<NNN>`.
//!
//! The sequence number is unique per (tag, date) pair and derived by
//! scanning existing artifact names, never from file timestamps. Two
//! processes allocating an identifier for the same tag at the same time
//! can pick the same number; runs are expected to be started by one
//! operator at a time.

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;

/// Date format used inside identifiers.
pub const DATE_FORMAT: &str = "%Y_%m_%d";

/// Length of a formatted date (`YYYY_MM_DD`).
const DATE_LEN: usize = 10;

/// Minimum number of digits in the sequence.
const SEQUENCE_WIDTH: usize = 3;

/// A unique, sortable name for one training run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId {
    /// Dataset variant or experiment tag.
    pub tag: String,
    /// Day the run was started.
    pub date: NaiveDate,
    /// 1-based sequence within (tag, date).
    pub sequence: u32,
}

impl RunId {
    /// Parse an artifact name that starts with a run identifier for
    /// `tag`, such as `raw_2024_01_01_003_best.pt`.
    ///
    /// Anything after the sequence digits is ignored as long as it does
    /// not start with another digit.
    #[must_use]
    pub fn parse_prefixed(name: &str, tag: &str) -> Option<Self> {
        let rest = name.strip_prefix(tag)?.strip_prefix('_')?;
        let date_str = rest.get(..DATE_LEN)?;
        let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).ok()?;
        let rest = rest[DATE_LEN..].strip_prefix('_')?;
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits < SEQUENCE_WIDTH {
            return None;
        }
        let sequence = rest[..digits].parse().ok()?;
        Some(Self {
            tag: tag.to_owned(),
            date,
            sequence,
        })
    }

    /// The date component as it appears in the identifier.
    #[must_use]
    pub fn date_stamp(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{:0width$}",
            self.tag,
            self.date.format(DATE_FORMAT),
            self.sequence,
            width = SEQUENCE_WIDTH,
        )
    }
}

impl PartialOrd for RunId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RunId {
    /// Orders by date, then sequence. Tags compare last.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.date, self.sequence, &self.tag).cmp(&(other.date, other.sequence, &other.tag))
    }
}

/// The next identifier for (`tag`, `date`) given existing artifact names.
///
/// Returns sequence `001` when no artifact matches, otherwise one more
/// than the highest sequence found. Artifacts of other tags or dates are
/// ignored.
pub fn next_run_id<I, S>(existing: I, tag: &str, date: NaiveDate) -> RunId
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let highest = existing
        .into_iter()
        .filter_map(|name| RunId::parse_prefixed(name.as_ref(), tag))
        .filter(|id| id.date == date)
        .map(|id| id.sequence)
        .max()
        .unwrap_or(0);
    RunId {
        tag: tag.to_owned(),
        date,
        sequence: highest.saturating_add(1),
    }
}

/// The most recent run for `tag`, by date then sequence.
pub fn latest_run<I, S>(existing: I, tag: &str) -> Option<RunId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    existing
        .into_iter()
        .filter_map(|name| RunId::parse_prefixed(name.as_ref(), tag))
        .max()
}

/// File names in `dir`. A missing directory has no entries.
///
/// # Errors
///
/// Returns the I/O error if `dir` exists but cannot be read.
pub fn artifact_names(dir: &Path) -> std::io::Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        if let Some(name) = entry?.file_name().to_str() {
            names.push(name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}
