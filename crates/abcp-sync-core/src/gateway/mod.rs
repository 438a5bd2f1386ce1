//! Bitrix24 destination gateway

mod bitrix;
pub mod fields;

use serde_json::{Map, Value};

use crate::error::Result;

pub use bitrix::BitrixClient;
pub use fields::{coerce_balance, BalanceValue};

/// Contact to create in the destination, before payload normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDraft {
    /// Display name; the derived deal title
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub inn: Option<String>,
    pub comment: String,
}

/// Deal to create in the users pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DealDraft {
    pub contact_id: i64,
    pub title: String,
    pub category_id: i64,
    pub stage_id: String,
    /// `UF_*` keys mapped to their values
    pub custom_fields: Map<String, Value>,
}

/// Write operations against the destination CRM.
///
/// Each call either returns the id of the entity it created or fails; a
/// failed call is not assumed to have created anything.
#[allow(async_fn_in_trait)]
pub trait DestinationGateway {
    async fn create_contact(&self, contact: &ContactDraft) -> Result<i64>;

    async fn create_deal(&self, deal: &DealDraft) -> Result<i64>;
}
