//! Typed write commands
//!
//! A `Command` is one parsed write destined for a named downstream target.
//! The payload is an ordered sequence of opaque field values. The relay
//! never inspects field contents, it only carries them through to the
//! store client in append order.

use bytes::Bytes;

/// One unit of write data: an ordered sequence of opaque field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    fields: Vec<Bytes>,
}

impl Row {
    pub fn new(fields: Vec<Bytes>) -> Self {
        Row { fields }
    }

    /// Build a row from string-like field values (test/ingest convenience).
    pub fn from_fields<I, T>(fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Row {
            fields: fields
                .into_iter()
                .map(|f| Bytes::copy_from_slice(f.as_ref()))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[Bytes] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A parsed write command: one row bound for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Downstream resource the row is destined for (e.g. a table name).
    /// Compared by exact value; the relay performs no normalization.
    pub target: String,
    /// Opaque payload appended to the target's buffer.
    pub row: Row,
}

impl Command {
    pub fn new(target: impl Into<String>, row: Row) -> Self {
        Command {
            target: target.into(),
            row,
        }
    }
}

/// A target is usable as a buffer key if it is non-empty and contains no
/// whitespace or control characters. Anything else is rejected before a
/// buffer is created for it.
pub fn is_valid_target(target: &str) -> bool {
    !target.is_empty()
        && !target
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_from_fields() {
        let row = Row::from_fields(["1", "alice", "2024-01-01"]);
        assert_eq!(row.len(), 3);
        assert_eq!(row.fields()[1], Bytes::from_static(b"alice"));
    }

    #[test]
    fn test_target_validation() {
        assert!(is_valid_target("events"));
        assert!(is_valid_target("schema.events_v2"));
        assert!(!is_valid_target(""));
        assert!(!is_valid_target("two words"));
        assert!(!is_valid_target("tab\there"));
        assert!(!is_valid_target("ctrl\u{1}char"));
    }

    #[test]
    fn test_command_construction() {
        let cmd = Command::new("events", Row::from_fields(["a", "b"]));
        assert_eq!(cmd.target, "events");
        assert_eq!(cmd.row.len(), 2);
    }
}
