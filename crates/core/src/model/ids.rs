use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

numeric_id!(
    /// Identifier of a progress record (a tables row id, or a legacy comment id).
    ProgressId
);
numeric_id!(
    /// Identifier of a course, lesson or quiz post.
    SubjectId
);
numeric_id!(
    /// Identifier of a learner.
    UserId
);
numeric_id!(QuestionId);
numeric_id!(SubmissionId);
numeric_id!(AnswerId);
numeric_id!(GradeId);
numeric_id!(
    /// Strictly increasing identifier of a legacy source row; the migration cursor.
    LegacyRowId
);

impl LegacyRowId {
    /// Cursor value before any row has been migrated.
    pub const START: Self = Self(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_and_parse() {
        let id = SubjectId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(" 42 ".parse::<SubjectId>().unwrap(), id);
    }

    #[test]
    fn invalid_id_names_its_kind() {
        let err = "abc".parse::<UserId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse UserId from string");
    }

    #[test]
    fn debug_includes_type_name() {
        assert_eq!(format!("{:?}", QuestionId::new(7)), "QuestionId(7)");
    }

    #[test]
    fn legacy_cursor_starts_at_zero() {
        assert_eq!(LegacyRowId::START.value(), 0);
        assert!(LegacyRowId::new(1) > LegacyRowId::START);
    }
}
