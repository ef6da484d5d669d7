/// Subscriber authorization table.
///
/// Loaded once at receiver startup from a line-oriented text source, one
/// record per line: subscriber number, technology code, status (0 = not
/// paid, 1 = granted), whitespace separated. Read-only afterwards.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::protocol::AccessStatus;

/// One authorization record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    pub number: u32,
    pub technology: u8,
    pub status: AccessStatus,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot read subscriber table: {0}")]
    Io(#[from] io::Error),
    #[error("subscriber table line {line}: {msg}")]
    Parse { line: usize, msg: String },
}

/// In-memory authorization table.
#[derive(Debug, Clone)]
pub struct AccessTable {
    records: Vec<Subscriber>,
}

impl AccessTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse the whole table text. Blank lines are skipped; anything else
    /// must carry exactly the three fields.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut records = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let mut fields = raw.split_whitespace();
            let number = parse_field(fields.next(), line, "subscriber number")?;
            let technology = parse_field(fields.next(), line, "technology code")?;
            let status = match fields.next() {
                Some("0") => AccessStatus::NotPaid,
                Some("1") => AccessStatus::Granted,
                Some(other) => {
                    return Err(TableError::Parse {
                        line,
                        msg: format!("invalid status {other:?} (expected 0 or 1)"),
                    });
                }
                None => {
                    return Err(TableError::Parse {
                        line,
                        msg: "missing status".into(),
                    });
                }
            };
            records.push(Subscriber {
                number,
                technology,
                status,
            });
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Linear scan over all records; the first exact match on both fields
    /// wins. No match at all means NOT_FOUND.
    pub fn lookup(&self, number: u32, technology: u8) -> AccessStatus {
        self.records
            .iter()
            .find(|r| r.number == number && r.technology == technology)
            .map(|r| r.status)
            .unwrap_or(AccessStatus::NotFound)
    }
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    line: usize,
    what: &str,
) -> Result<T, TableError> {
    let raw = field.ok_or_else(|| TableError::Parse {
        line,
        msg: format!("missing {what}"),
    })?;
    raw.parse().map_err(|_| TableError::Parse {
        line,
        msg: format!("invalid {what} {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
1001 4 1
2002 2 0
3003 5 1
4004 3 0
";

    #[test]
    fn lookup_three_outcomes() {
        let table = AccessTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup(1001, 4), AccessStatus::Granted);
        // Subscriber exists, but not on this technology.
        assert_eq!(table.lookup(1001, 3), AccessStatus::NotFound);
        assert_eq!(table.lookup(2002, 2), AccessStatus::NotPaid);
        assert_eq!(table.lookup(9999, 4), AccessStatus::NotFound);
    }

    #[test]
    fn first_match_wins() {
        let table = AccessTable::parse("1001 4 0\n1001 4 1\n").unwrap();
        assert_eq!(table.lookup(1001, 4), AccessStatus::NotPaid);
    }

    #[test]
    fn blank_lines_skipped() {
        let table = AccessTable::parse("\n1001 4 1\n\n\n2002 2 0\n").unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let err = AccessTable::parse("1001 4 1\nnope 4 1\n").unwrap_err();
        assert!(matches!(err, TableError::Parse { line: 2, .. }));

        let err = AccessTable::parse("1001 4 7\n").unwrap_err();
        assert!(matches!(err, TableError::Parse { line: 1, .. }));

        let err = AccessTable::parse("1001 4\n").unwrap_err();
        assert!(matches!(err, TableError::Parse { line: 1, .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AccessTable::load("/nonexistent/subscribers.txt").unwrap_err();
        assert!(matches!(err, TableError::Io(_)));
    }
}
