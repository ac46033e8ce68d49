use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::trimmed;

pub const ITEM_COLUMNS: &str = "id, code, name, quantity, available, borrowed, unit, category, \
     condition, description, image_url, file_ids, created_date, updated_date";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Item {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub quantity: i32,
    pub available: i32,
    pub borrowed: i32,
    pub unit: String,
    pub category: String,
    pub condition: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub file_ids: Vec<i32>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ItemCreateRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, length(min = 1))]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    #[validate(required, range(min = 1))]
    pub quantity: Option<i32>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, length(min = 1))]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, length(min = 1))]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, length(min = 1))]
    pub condition: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default, alias = "fileIds")]
    pub file_ids: Option<Vec<i32>>,
}

/// Absent fields are left alone; `description` and `image_url` can be cleared with `null`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ItemUpdateRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1))]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: Option<i32>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1))]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1))]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1))]
    pub condition: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub image_url: Option<Option<String>>,
    #[serde(default, alias = "fileIds")]
    pub file_ids: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

/// Available count after the total quantity of an item changes.
/// Returns `None` when the new total cannot cover what is currently lent out.
pub fn available_after_resize(quantity: i32, borrowed: i32) -> Option<i32> {
    if quantity < borrowed {
        return None;
    }
    Some(quantity - borrowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_keeps_quantity_invariant() {
        let available = available_after_resize(12, 5).unwrap();
        assert_eq!(12, available + 5);
    }

    #[test]
    fn resize_rejects_total_below_borrowed() {
        assert_eq!(available_after_resize(3, 4), None);
        assert_eq!(available_after_resize(4, 4), Some(0));
    }

    #[test]
    fn create_accepts_camel_case_file_ids() {
        let req: ItemCreateRequest = serde_json::from_str(
            r#"{"code": "OSC-01", "name": "Oscilloscope", "quantity": 3, "fileIds": [4, 5]}"#,
        )
        .unwrap();
        assert_eq!(req.file_ids, Some(vec![4, 5]));
        assert_eq!(req.unit, None);
    }

    #[test]
    fn create_requires_fields_and_positive_quantity() {
        let req: ItemCreateRequest = serde_json::from_str(
            r#"{"code": " ", "name": "Oscilloscope", "quantity": 0,
                "unit": "pcs", "category": "Elektronik"}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        let mut fields: Vec<_> = errors.field_errors().keys().map(|f| f.to_string()).collect();
        fields.sort();
        assert_eq!(fields, vec!["code", "condition", "quantity"]);

        let req: ItemCreateRequest = serde_json::from_str(
            r#"{"code": "OSC-01", "name": " Oscilloscope ", "quantity": 2,
                "unit": "pcs", "category": "Elektronik", "condition": "baik"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.name.as_deref(), Some("Oscilloscope"));
    }

    #[test]
    fn update_rejects_blank_name_and_zero_quantity() {
        let req: ItemUpdateRequest = serde_json::from_str(r#"{"name": "  "}"#).unwrap();
        assert!(req.validate().is_err());

        let req: ItemUpdateRequest = serde_json::from_str(r#"{"quantity": 0}"#).unwrap();
        assert!(req.validate().is_err());

        let req: ItemUpdateRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_distinguishes_cleared_from_absent() {
        let req: ItemUpdateRequest =
            serde_json::from_str(r#"{"description": null, "name": "Scope"}"#).unwrap();
        assert_eq!(req.description, Some(None));
        assert_eq!(req.image_url, None);
    }
}
