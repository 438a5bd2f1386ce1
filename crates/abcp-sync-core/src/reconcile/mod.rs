//! Reconciliation of unsynced user records into Bitrix24 contacts and deals.
//!
//! A record moves `Imported -> ContactEnsured -> Synced`. The contact id is
//! persisted as soon as the contact exists, before the deal is attempted, so
//! an interrupted record resumes from the contact it already has instead of
//! creating a second one. The deal id, `synced` flag and `synced_at` land in a
//! single statement.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::{CustomFieldKeys, DestinationConfig};
use crate::db::UserRepository;
use crate::error::{Error, Result};
use crate::gateway::fields::normalize_datetime;
use crate::gateway::{coerce_balance, ContactDraft, DealDraft, DestinationGateway};
use crate::models::UserRecord;
use crate::util::unix_millis_now;

/// Pipeline placement and field mapping for created deals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealSettings {
    pub title_prefix: String,
    pub category_id: i64,
    pub stage_id: String,
    pub fields: CustomFieldKeys,
}

impl DealSettings {
    pub fn from_destination(destination: &DestinationConfig) -> Self {
        Self {
            title_prefix: destination.deal_title_prefix.clone(),
            category_id: destination.deal_category_id,
            stage_id: destination.deal_stage_id.clone(),
            fields: destination.fields.clone(),
        }
    }
}

/// Step of the per-record state machine that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    EnsureContact,
    EnsureDeal,
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnsureContact => write!(f, "ensure_contact"),
            Self::EnsureDeal => write!(f, "ensure_deal"),
        }
    }
}

/// A record left unsynced by this batch, with enough context to replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub abcp_user_id: String,
    pub step: SyncStep,
    pub error: String,
}

/// Outcome of one `sync_batch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub selected: usize,
    pub synced: usize,
    pub contacts_created: usize,
    pub contacts_reused: usize,
    pub failures: Vec<RecordFailure>,
}

/// Drives unsynced records through contact and deal creation.
pub struct Reconciler<'a, U, G> {
    users: &'a U,
    gateway: &'a G,
    settings: DealSettings,
}

impl<'a, U, G> Reconciler<'a, U, G>
where
    U: UserRepository,
    G: DestinationGateway,
{
    pub const fn new(users: &'a U, gateway: &'a G, settings: DealSettings) -> Self {
        Self {
            users,
            gateway,
            settings,
        }
    }

    /// Process up to `limit` unsynced records, oldest first.
    ///
    /// Records are handled one at a time and a failing record never stops the
    /// batch; it stays unsynced and shows up in [`SyncReport::failures`]. Only
    /// a failure to read the batch itself is returned as an error.
    pub async fn sync_batch(&self, limit: Option<usize>) -> Result<SyncReport> {
        let records = self.users.list_unsynced(limit).await?;
        let mut report = SyncReport {
            selected: records.len(),
            ..SyncReport::default()
        };

        if records.is_empty() {
            tracing::info!("No unsynced records");
            return Ok(report);
        }
        tracing::info!(selected = records.len(), ?limit, "Sync batch started");

        for record in &records {
            match self.sync_record(record, &mut report).await {
                Ok(deal_id) => {
                    report.synced += 1;
                    tracing::info!(abcp_user_id = %record.abcp_user_id, deal_id, "Record synced");
                }
                Err((step, error)) => {
                    tracing::error!(
                        abcp_user_id = %record.abcp_user_id,
                        %step,
                        %error,
                        "Record sync failed"
                    );
                    report.failures.push(RecordFailure {
                        abcp_user_id: record.abcp_user_id.clone(),
                        step,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            selected = report.selected,
            synced = report.synced,
            failed = report.failures.len(),
            "Sync batch finished"
        );
        Ok(report)
    }

    async fn sync_record(
        &self,
        record: &UserRecord,
        report: &mut SyncReport,
    ) -> std::result::Result<i64, (SyncStep, Error)> {
        let title = deal_title(record, &self.settings.title_prefix);

        let contact_id = if let Some(contact_id) = record.b24_contact_id {
            tracing::debug!(abcp_user_id = %record.abcp_user_id, contact_id, "Reusing contact");
            report.contacts_reused += 1;
            contact_id
        } else {
            let contact_id = self
                .gateway
                .create_contact(&contact_draft(record, &title))
                .await
                .map_err(|error| (SyncStep::EnsureContact, error))?;

            if let Err(error) = self.users.save_contact_id(record.id, contact_id).await {
                tracing::error!(
                    abcp_user_id = %record.abcp_user_id,
                    contact_id,
                    "Contact created but its id was not stored"
                );
                return Err((SyncStep::EnsureContact, error));
            }
            report.contacts_created += 1;
            contact_id
        };

        let deal = DealDraft {
            contact_id,
            title,
            category_id: self.settings.category_id,
            stage_id: self.settings.stage_id.clone(),
            custom_fields: deal_custom_fields(record, &self.settings.fields),
        };

        let deal_id = self
            .gateway
            .create_deal(&deal)
            .await
            .map_err(|error| (SyncStep::EnsureDeal, error))?;

        self.users
            .mark_synced(record.id, deal_id, unix_millis_now())
            .await
            .map_err(|error| (SyncStep::EnsureDeal, error))?;

        Ok(deal_id)
    }
}

/// Organization name when present, otherwise `prefix` followed by the source id.
pub fn deal_title(record: &UserRecord, prefix: &str) -> String {
    record.organization().map_or_else(
        || format!("{prefix}{}", record.abcp_user_id),
        str::to_string,
    )
}

fn contact_draft(record: &UserRecord, title: &str) -> ContactDraft {
    ContactDraft {
        name: title.to_string(),
        phone: record.preferred_phone().map(str::to_string),
        email: record.email.clone(),
        inn: record.inn.clone(),
        comment: format!(
            "ABCP userId: {}; City: {}; Registered: {}",
            record.abcp_user_id,
            record.city.as_deref().unwrap_or_default(),
            record.registration_date.as_deref().unwrap_or_default(),
        ),
    }
}

fn deal_custom_fields(record: &UserRecord, keys: &CustomFieldKeys) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(keys.deal_user_id.clone(), json!(record.abcp_user_id));
    fields.insert(
        keys.deal_inn.clone(),
        json!(record.inn.as_deref().map(str::trim).unwrap_or_default()),
    );

    if let Some(balance) = coerce_balance(record.balance.as_deref()) {
        fields.insert(keys.deal_balance.clone(), balance.into());
    }

    let dates = [
        (&keys.deal_registration_date, &record.registration_date),
        (&keys.deal_update_time, &record.update_time),
    ];
    for (key, value) in dates {
        if let (Some(key), Some(value)) = (key, normalize_datetime(value.as_deref())) {
            fields.insert(key.clone(), json!(value));
        }
    }

    fields
}
