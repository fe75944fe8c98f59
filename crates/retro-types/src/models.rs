use serde::{Deserialize, Serialize};

/// Visual component kinds a board can hold.
///
/// Stored as the uppercase wire name both on the log and in the `components`
/// table, so the enum is the single source of truth for the spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentType {
    Note,
    Column,
    Sticker,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "NOTE",
            Self::Column => "COLUMN",
            Self::Sticker => "STICKER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOTE" => Some(Self::Note),
            "COLUMN" => Some(Self::Column),
            "STICKER" => Some(Self::Sticker),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_round_trips_through_parse() {
        for kind in [ComponentType::Note, ComponentType::Column, ComponentType::Sticker] {
            assert_eq!(ComponentType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ComponentType::parse("DOODLE"), None);
    }
}
