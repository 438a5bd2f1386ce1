//! Locally cached ABCP user and its Bitrix24 synchronization state

use serde::{Deserialize, Serialize};

/// Reconciliation progress of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Profile present, nothing created remotely yet
    Imported,
    /// A destination contact exists, the deal does not
    ContactEnsured,
    /// Contact and deal exist (terminal)
    Synced,
}

/// One ABCP user plus its synchronization state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Local row id; ascending order is local creation order
    pub id: i64,
    /// Source-assigned user id (unique, immutable)
    pub abcp_user_id: String,
    pub name: Option<String>,
    pub second_name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub organization_name: Option<String>,
    /// Tax id (INN), as received
    pub inn: Option<String>,
    /// Locale-formatted balance string, as received
    pub balance: Option<String>,
    pub registration_date: Option<String>,
    pub update_time: Option<String>,
    /// Original source payload
    pub raw_json: String,
    pub synced: bool,
    /// Unix ms
    pub synced_at: Option<i64>,
    pub b24_contact_id: Option<i64>,
    pub b24_deal_id: Option<i64>,
    /// Unix ms
    pub created_at: i64,
    /// Unix ms
    pub updated_at: i64,
}

impl UserRecord {
    /// Derive the reconciliation state from the persisted columns.
    pub const fn sync_state(&self) -> SyncState {
        if self.synced {
            SyncState::Synced
        } else if self.b24_contact_id.is_some() {
            SyncState::ContactEnsured
        } else {
            SyncState::Imported
        }
    }

    /// Preferred phone for the destination contact: mobile, then landline.
    pub fn preferred_phone(&self) -> Option<&str> {
        self.mobile
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.phone.as_deref().filter(|value| !value.trim().is_empty()))
    }

    /// Organization name when present and non-blank.
    pub fn organization(&self) -> Option<&str> {
        self.organization_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
pub(crate) fn sample_record(abcp_user_id: &str) -> UserRecord {
    UserRecord {
        id: 1,
        abcp_user_id: abcp_user_id.to_string(),
        name: Some("Ivan".to_string()),
        second_name: None,
        surname: Some("Petrov".to_string()),
        email: Some("ivan@example.com".to_string()),
        mobile: None,
        phone: Some("+7 (900) 123-45-67".to_string()),
        city: Some("Moscow".to_string()),
        state: Some("1".to_string()),
        organization_name: None,
        inn: Some("7701234567".to_string()),
        balance: Some("-1\u{a0}582,00".to_string()),
        registration_date: Some("2024-05-01 10:00:00".to_string()),
        update_time: None,
        raw_json: "{}".to_string(),
        synced: false,
        synced_at: None,
        b24_contact_id: None,
        b24_deal_id: None,
        created_at: 0,
        updated_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_progression() {
        let mut record = sample_record("42");
        assert_eq!(record.sync_state(), SyncState::Imported);

        record.b24_contact_id = Some(10);
        assert_eq!(record.sync_state(), SyncState::ContactEnsured);

        record.b24_deal_id = Some(20);
        record.synced = true;
        assert_eq!(record.sync_state(), SyncState::Synced);
    }

    #[test]
    fn test_preferred_phone_falls_back_to_landline() {
        let mut record = sample_record("42");
        assert_eq!(record.preferred_phone(), Some("+7 (900) 123-45-67"));

        record.mobile = Some("  ".to_string());
        assert_eq!(record.preferred_phone(), Some("+7 (900) 123-45-67"));

        record.mobile = Some("89001112233".to_string());
        assert_eq!(record.preferred_phone(), Some("89001112233"));
    }

    #[test]
    fn test_organization_ignores_blank() {
        let mut record = sample_record("42");
        record.organization_name = Some("   ".to_string());
        assert_eq!(record.organization(), None);

        record.organization_name = Some(" Acme LLC ".to_string());
        assert_eq!(record.organization(), Some("Acme LLC"));
    }
}
