//! Medicine name keys.
//!
//! Prescriptions, sales, purchase orders and the catalog refer to the same
//! medicine through free-text names owned by different systems. Every name
//! join in the backend goes through [`MedicineKey`] so the matching rule lives
//! in exactly one place.

use core::fmt;

/// Normalized medicine name used for cross-system matching.
///
/// Two names match when they are equal after trimming and lowercasing.
/// There is no fuzzy matching and strength is not part of the key, so
/// `"Amoxicillin"` at 250mg and at 500mg are the same item.
///
/// ```
/// use dispensary_core::MedicineKey;
///
/// let prescribed = MedicineKey::new("  Amoxicillin 250mg ").unwrap();
/// assert!(prescribed.matches("amoxicillin 250MG"));
/// assert!(MedicineKey::new("   ").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MedicineKey(String);

impl MedicineKey {
    /// Build the key for a raw name, or `None` when the name is blank.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Build the key for an optional raw name.
    #[must_use]
    pub fn from_optional(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::new)
    }

    /// Whether `raw` normalizes to this key.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        Self::new(raw).is_some_and(|other| other == *self)
    }

    /// The normalized form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MedicineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MedicineKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
