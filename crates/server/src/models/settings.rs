//! System settings: the integration toggles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which external system a toggle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Integration {
    Emr,
    Billing,
}

impl std::fmt::Display for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emr => write!(f, "EMR"),
            Self::Billing => write!(f, "billing"),
        }
    }
}

/// Toggle and last successful sync of one integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSettings {
    pub enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

/// The single settings row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub emr: IntegrationSettings,
    pub billing: IntegrationSettings,
}

impl SystemSettings {
    #[must_use]
    pub const fn integration(&self, which: Integration) -> IntegrationSettings {
        match which {
            Integration::Emr => self.emr,
            Integration::Billing => self.billing,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self, which: Integration) -> bool {
        self.integration(which).enabled
    }

    /// Apply a settings update in place.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(toggle) = update.emr {
            self.emr.enabled = toggle.enabled;
        }
        if let Some(toggle) = update.billing {
            self.billing.enabled = toggle.enabled;
        }
    }

    /// Record a successful sync.
    pub fn stamp(&mut self, which: Integration, at: DateTime<Utc>) {
        match which {
            Integration::Emr => self.emr.last_sync = Some(at),
            Integration::Billing => self.billing.last_sync = Some(at),
        }
    }
}

/// `{"enabled": bool}` as sent by the settings page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Toggle {
    pub enabled: bool,
}

/// Body of `PUT /api/settings`. Absent sections are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsUpdate {
    pub emr: Option<Toggle>,
    pub billing: Option<Toggle>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_disabled() {
        let settings = SystemSettings::default();
        assert!(!settings.is_enabled(Integration::Emr));
        assert!(!settings.is_enabled(Integration::Billing));
    }

    #[test]
    fn test_partial_update() {
        let mut settings = SystemSettings::default();
        let update: SettingsUpdate =
            serde_json::from_str(r#"{"billing": {"enabled": true}}"#).unwrap();
        settings.apply(&update);
        assert!(settings.billing.enabled);
        assert!(!settings.emr.enabled);
    }

    #[test]
    fn test_stamp_only_touches_one_side() {
        let mut settings = SystemSettings::default();
        let now = Utc::now();
        settings.stamp(Integration::Billing, now);
        assert_eq!(settings.billing.last_sync, Some(now));
        assert_eq!(settings.emr.last_sync, None);
    }
}
