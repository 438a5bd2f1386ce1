//! User object as delivered by the ABCP `/cp/users` listing

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Profile and provenance fields extracted from one ABCP user object.
///
/// Text fields accept JSON strings and numbers; blank values become `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUser {
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
    pub inn: Option<String>,
    pub balance: Option<String>,
    pub registration_date: Option<String>,
    pub update_time: Option<String>,
    pub raw_json: String,
}

impl SourceUser {
    /// Parse a raw listing item.
    ///
    /// The identity is read from `userId`, then `userID`, then `id`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidInput("source user is not a JSON object".to_string()))?;

        let abcp_user_id = ["userId", "userID", "id"]
            .iter()
            .find_map(|key| text_field(object, key))
            .ok_or_else(|| Error::InvalidInput("source user has no userId".to_string()))?;

        Ok(Self {
            abcp_user_id,
            name: text_field(object, "name"),
            second_name: text_field(object, "secondName"),
            surname: text_field(object, "surname"),
            email: text_field(object, "email"),
            mobile: text_field(object, "mobile"),
            phone: text_field(object, "phone"),
            city: text_field(object, "city"),
            state: text_field(object, "state"),
            organization_name: text_field(object, "organizationName"),
            inn: text_field(object, "inn"),
            balance: text_field(object, "saldo"),
            registration_date: text_field(object, "registrationDate"),
            update_time: text_field(object, "updateTime"),
            raw_json: serde_json::to_string(value)?,
        })
    }

    /// Whether the registration timestamp falls on `day`.
    ///
    /// ABCP sends `YYYY-MM-DD HH:MM:SS`; only the date prefix is compared.
    pub fn registered_on(&self, day: chrono::NaiveDate) -> bool {
        let prefix = day.format("%Y-%m-%d").to_string();
        self.registration_date
            .as_deref()
            .is_some_and(|value| value.starts_with(&prefix))
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match object.get(key)? {
        Value::String(value) => value.trim().to_string(),
        Value::Number(value) => value.to_string(),
        Value::Bool(value) => value.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_full_item() {
        let item = json!({
            "userId": 1001,
            "name": "Ivan",
            "secondName": "",
            "surname": "Petrov",
            "email": "ivan@example.com",
            "mobile": "+79001234567",
            "city": "Moscow",
            "state": 1,
            "organizationName": "Acme LLC",
            "inn": "7701234567",
            "saldo": "-1 582,00",
            "registrationDate": "2024-05-01 10:00:00",
            "updateTime": "2024-05-02 11:00:00"
        });

        let user = SourceUser::from_value(&item).unwrap();
        assert_eq!(user.abcp_user_id, "1001");
        assert_eq!(user.name.as_deref(), Some("Ivan"));
        assert_eq!(user.second_name, None);
        assert_eq!(user.state.as_deref(), Some("1"));
        assert_eq!(user.organization_name.as_deref(), Some("Acme LLC"));
        assert_eq!(user.balance.as_deref(), Some("-1 582,00"));
        assert_eq!(user.phone, None);

        let raw: Value = serde_json::from_str(&user.raw_json).unwrap();
        assert_eq!(raw, item);
    }

    #[test]
    fn test_identity_fallbacks() {
        let user = SourceUser::from_value(&json!({"userID": "77"})).unwrap();
        assert_eq!(user.abcp_user_id, "77");

        let user = SourceUser::from_value(&json!({"id": 5})).unwrap();
        assert_eq!(user.abcp_user_id, "5");
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let err = SourceUser::from_value(&json!({"name": "Nobody", "userId": ""})).unwrap_err();
        assert!(err.to_string().contains("userId"));

        assert!(SourceUser::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_registered_on_compares_date_prefix() {
        let user = SourceUser::from_value(&json!({
            "userId": "1",
            "registrationDate": "2024-05-01 23:59:59"
        }))
        .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert!(user.registered_on(day));
        assert!(!user.registered_on(next_day));

        let undated = SourceUser::from_value(&json!({"userId": "2"})).unwrap();
        assert!(!undated.registered_on(day));
    }
}
