//! Medicine strength enumeration.

use serde::{Deserialize, Serialize};

/// Error returned when a strength label is not one of the stocked strengths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported strength {0:?}")]
pub struct StrengthError(pub String);

/// Strength of a catalog medicine.
///
/// The catalog only stocks a fixed set of strengths. The wire and database
/// spelling is the label itself (`"250mg"`, `"10mg/5ml"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "medicine_strength"))]
pub enum Strength {
    #[serde(rename = "100mg")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "100mg"))]
    Mg100,
    #[serde(rename = "250mg")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "250mg"))]
    Mg250,
    #[default]
    #[serde(rename = "500mg")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "500mg"))]
    Mg500,
    #[serde(rename = "1000mg")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "1000mg"))]
    Mg1000,
    #[serde(rename = "10mg/5ml")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "10mg/5ml"))]
    Mg10Per5Ml,
    #[serde(rename = "20mg")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "20mg"))]
    Mg20,
}

impl Strength {
    /// Every stocked strength, in catalog order.
    pub const ALL: [Self; 6] = [
        Self::Mg100,
        Self::Mg250,
        Self::Mg500,
        Self::Mg1000,
        Self::Mg10Per5Ml,
        Self::Mg20,
    ];

    /// The label shown to users and stored in the database.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mg100 => "100mg",
            Self::Mg250 => "250mg",
            Self::Mg500 => "500mg",
            Self::Mg1000 => "1000mg",
            Self::Mg10Per5Ml => "10mg/5ml",
            Self::Mg20 => "20mg",
        }
    }
}

impl std::fmt::Display for Strength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Strength {
    type Err = StrengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|strength| strength.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| StrengthError(s.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_500mg() {
        assert_eq!(Strength::default(), Strength::Mg500);
    }

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for strength in Strength::ALL {
            assert_eq!(strength.label().parse::<Strength>().unwrap(), strength);
        }
        assert_eq!(" 10MG/5ML ".parse::<Strength>().unwrap(), Strength::Mg10Per5Ml);
    }

    #[test]
    fn test_rejects_unknown_strength() {
        assert!("750mg".parse::<Strength>().is_err());
        assert!(serde_json::from_str::<Strength>("\"750mg\"").is_err());
    }

    #[test]
    fn test_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Strength::Mg250).unwrap(), "\"250mg\"");
    }
}
