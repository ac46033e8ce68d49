use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::trimmed;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[display(fmt = "admin")]
    Admin,
    #[display(fmt = "user")]
    User,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[display(fmt = "active")]
    Active,
    #[display(fmt = "inactive")]
    Inactive,
}

/// Columns returned to clients. `password_hash` is never part of it.
pub const USER_COLUMNS: &str = "id, name, email, role, employee_id, work_unit, phone, \
     student_id, study_program, faculty, whatsapp, avatar, status, created_date, updated_date";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub employee_id: Option<String>,
    pub work_unit: Option<String>,
    pub phone: Option<String>,
    pub student_id: Option<String>,
    pub study_program: Option<String>,
    pub faculty: Option<String>,
    pub whatsapp: Option<String>,
    pub avatar: Option<String>,
    pub status: UserStatus,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Borrower {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub student_id: Option<String>,
    pub study_program: Option<String>,
    pub faculty: Option<String>,
    pub whatsapp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Role-specific and profile fields shared by create and update payloads.
/// `None` leaves the column untouched, `Some(None)` (JSON `null` or `""`) clears it.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileFields {
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub employee_id: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub work_unit: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub student_id: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub study_program: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub faculty: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub whatsapp: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub avatar: Option<Option<String>>,
}

impl ProfileFields {
    /// Column/value pairs present in the payload, empty strings normalised to NULL.
    pub fn present(&self) -> Vec<(&'static str, Option<String>)> {
        [
            ("employee_id", &self.employee_id),
            ("work_unit", &self.work_unit),
            ("phone", &self.phone),
            ("student_id", &self.student_id),
            ("study_program", &self.study_program),
            ("faculty", &self.faculty),
            ("whatsapp", &self.whatsapp),
            ("avatar", &self.avatar),
        ]
        .into_iter()
        .filter_map(|(column, value)| {
            value
                .as_ref()
                .map(|v| (column, v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from)))
        })
        .collect()
    }

    /// Value to insert for a column on create.
    pub fn value(&self, column: &str) -> Option<String> {
        self.present()
            .into_iter()
            .find(|(c, _)| *c == column)
            .and_then(|(_, v)| v)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UserCreateRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, email)]
    pub email: Option<String>,
    #[validate(required, length(min = 1))]
    pub password: Option<String>,
    #[validate(required)]
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

/// Partial update; absent fields stay as they are.
#[derive(Debug, Deserialize, Validate)]
pub struct UserUpdateRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(email)]
    pub email: Option<String>,
    /// Empty means "keep the current password".
    pub password: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct BorrowerQuery {
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_fields_distinguish_absent_from_cleared() {
        let req: UserUpdateRequest = serde_json::from_str(
            r#"{"name": "Rina", "phone": null, "faculty": "", "whatsapp": "0812"}"#,
        )
        .unwrap();

        assert_eq!(req.name.as_deref(), Some("Rina"));
        let present = req.profile.present();
        assert_eq!(
            present,
            vec![
                ("phone", None),
                ("faculty", None),
                ("whatsapp", Some("0812".to_string())),
            ]
        );
    }

    #[test]
    fn role_and_status_parse_lowercase() {
        let req: UserCreateRequest = serde_json::from_str(
            r#"{"name": "A", "email": "a@lab.test", "password": "pw", "role": "admin", "status": "inactive"}"#,
        )
        .unwrap();
        assert_eq!(req.role, Some(Role::Admin));
        assert_eq!(req.status, Some(UserStatus::Inactive));
        assert_eq!(req.profile.value("employee_id"), None);
    }

    #[test]
    fn create_checks_email_shape_and_required_fields() {
        let req: UserCreateRequest = serde_json::from_str(
            r#"{"name": "  ", "email": "not-an-email", "password": "pw"}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        let mut fields: Vec<_> = errors.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        assert_eq!(fields, ["email", "name", "role"]);

        let req: UserCreateRequest = serde_json::from_str(
            r#"{"name": "Budi", "email": " budi@lab.test ", "password": "pw", "role": "user"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.email.as_deref(), Some("budi@lab.test"));
    }

    #[test]
    fn update_validates_only_present_fields() {
        let req: UserUpdateRequest = serde_json::from_str(r#"{"phone": "0812"}"#).unwrap();
        assert!(req.validate().is_ok());

        let req: UserUpdateRequest =
            serde_json::from_str(r#"{"name": "", "email": "budi@", "password": ""}"#).unwrap();
        let errors = req.validate().unwrap_err();
        let mut fields: Vec<_> = errors.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        assert_eq!(fields, ["email", "name"]);
    }

    #[test]
    fn roles_display_as_stored() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(UserStatus::Inactive.to_string(), "inactive");
    }
}
