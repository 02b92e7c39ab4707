use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Classification {
    HighlySensitive => "Highly Sensitive",
    Confidential => "Confidential",
    Public => "Public",
    Unsafe => "Unsafe",
    Error => "Error",
    Unknown => "Unknown",
});

impl Classification {
    pub fn all() -> &'static [Classification] {
        &[
            Self::HighlySensitive,
            Self::Confidential,
            Self::Public,
            Self::Unsafe,
            Self::Error,
            Self::Unknown,
        ]
    }

    /// Lenient label match for oracle and reviewer input.
    ///
    /// Case, spacing, `_` and `-` are ignored. Anything unrecognized is `Unknown`,
    /// so a free-text label can never leak into a result.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "highlysensitive" => Self::HighlySensitive,
            "confidential" => Self::Confidential,
            "public" => Self::Public,
            "unsafe" => Self::Unsafe,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

str_enum!(Recommendation {
    Confirm => "CONFIRM",
    Override => "OVERRIDE",
});

impl Recommendation {
    /// Anything other than an explicit override counts as a confirmation.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("override") {
            Self::Override
        } else {
            Self::Confirm
        }
    }
}

str_enum!(AuditAction {
    Classification => "classification",
    BatchClassification => "batch_classification",
    Reclassification => "re-classification",
});

str_enum!(OutcomeStatus {
    Success => "success",
    Error => "error",
});

str_enum!(JobStatus {
    Processing => "processing",
    Completed => "completed",
});
