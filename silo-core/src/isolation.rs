use crate::{DbError, ErrorKind, Result};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Transaction visibility level.
///
/// The set is closed. Drivers translate each level to backend semantics;
/// when a backend lacks a level it maps to the nearest stronger one, and
/// that mapping is a fixed per-driver contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Configuration string form, the same one `FromStr` accepts.
    pub fn as_config_str(&self) -> &'static str {
        match self {
            IsolationLevel::None => "none",
            IsolationLevel::ReadUncommitted => "read_uncommitted",
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = DbError;

    fn from_str(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(IsolationLevel::None),
            "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(DbError::new(
                "W3NH6KRBJ0DY",
                ErrorKind::ParseError,
                format!("`{other}` is not an isolation level"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_strings_map_one_to_one() {
        for level in [
            IsolationLevel::None,
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ] {
            assert_eq!(level.as_config_str().parse::<IsolationLevel>().unwrap(), level);
        }
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!(
            "Repeatable_Read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!(
            "SERIALIZABLE".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
    }

    #[test]
    fn unknown_strings_are_rejected() {
        let err = "snapshot".parse::<IsolationLevel>().unwrap_err();
        assert_eq!(err, ErrorKind::ParseError);
    }
}
