use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::trimmed;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "borrowing_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    #[display(fmt = "pending")]
    Pending,
    #[display(fmt = "approved")]
    Approved,
    #[display(fmt = "rejected")]
    Rejected,
    #[display(fmt = "returned")]
    Returned,
}

/// How an item's counters move when a borrowing changes status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// available -= quantity, borrowed += quantity
    CheckOut,
    /// available += quantity, borrowed -= quantity
    CheckIn,
    Unchanged,
}

impl BorrowingStatus {
    /// Stock movement for `self -> next`, or `None` if the transition is not allowed.
    ///
    /// pending -> approved | rejected, approved -> returned | rejected.
    /// Re-applying the current status is accepted and moves nothing.
    pub fn transition_to(self, next: BorrowingStatus) -> Option<StockChange> {
        use BorrowingStatus::*;

        match (self, next) {
            (current, next) if current == next => Some(StockChange::Unchanged),
            (Pending, Approved) => Some(StockChange::CheckOut),
            (Pending, Rejected) => Some(StockChange::Unchanged),
            (Approved, Returned) | (Approved, Rejected) => Some(StockChange::CheckIn),
            _ => None,
        }
    }

    /// Whether a borrowing in this status currently holds stock out of `available`.
    pub fn holds_stock(self) -> bool {
        self == BorrowingStatus::Approved
    }
}

pub const BORROWING_COLUMNS: &str = "id, borrower_id, item_id, quantity, borrow_date, return_date, \
     actual_return_date, purpose, notes, status, approved_by, approved_date, borrowing_letter_url, \
     borrowing_letter_file_ids, created_by, updated_by, created_date, updated_date";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Borrowing {
    pub id: i32,
    pub borrower_id: i32,
    pub item_id: i32,
    pub quantity: i32,
    pub borrow_date: NaiveDate,
    pub return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub purpose: String,
    pub notes: Option<String>,
    pub status: BorrowingStatus,
    pub approved_by: Option<i32>,
    pub approved_date: Option<DateTime<Utc>>,
    pub borrowing_letter_url: Option<String>,
    pub borrowing_letter_file_ids: Vec<i32>,
    pub created_by: Option<i32>,
    pub updated_by: Option<i32>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

/// Borrowing joined with the names shown in listings.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BorrowingDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub borrowing: Borrowing,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrower_phone: Option<String>,
    pub borrower_whatsapp: Option<String>,
    pub borrower_student_id: Option<String>,
    pub item_name: String,
    pub item_code: String,
    pub approved_by_name: Option<String>,
}

pub const BORROWING_DETAIL_SELECT: &str = "SELECT \
        b.id, b.borrower_id, b.item_id, b.quantity, b.borrow_date, b.return_date, \
        b.actual_return_date, b.purpose, b.notes, b.status, b.approved_by, b.approved_date, \
        b.borrowing_letter_url, b.borrowing_letter_file_ids, b.created_by, b.updated_by, \
        b.created_date, b.updated_date, \
        u.name AS borrower_name, u.email AS borrower_email, u.phone AS borrower_phone, \
        u.whatsapp AS borrower_whatsapp, u.student_id AS borrower_student_id, \
        i.name AS item_name, i.code AS item_code, \
        approver.name AS approved_by_name \
    FROM borrowings b \
    JOIN users u ON b.borrower_id = u.id \
    JOIN items i ON b.item_id = i.id \
    LEFT JOIN users approver ON b.approved_by = approver.id";

#[derive(Debug, Deserialize, Validate)]
pub struct BorrowingCreateRequest {
    pub borrower_id: Option<i32>,
    #[validate(required)]
    pub item_id: Option<i32>,
    #[validate(required, range(min = 1))]
    pub quantity: Option<i32>,
    #[validate(required)]
    pub borrow_date: Option<NaiveDate>,
    #[validate(required)]
    pub return_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required, length(min = 1))]
    pub purpose: Option<String>,
    pub borrowing_letter_url: Option<String>,
    #[serde(default)]
    pub borrowing_letter_file_ids: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct BorrowingUpdateRequest {
    pub status: Option<BorrowingStatus>,
    pub notes: Option<String>,
    pub actual_return_date: Option<NaiveDate>,
    #[serde(default)]
    pub borrowing_letter_file_ids: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct BorrowingQuery {
    pub search: Option<String>,
    pub status: Option<BorrowingStatus>,
}

#[cfg(test)]
mod tests {
    use super::BorrowingStatus::*;
    use super::*;

    #[test]
    fn approving_checks_stock_out() {
        assert_eq!(Pending.transition_to(Approved), Some(StockChange::CheckOut));
    }

    #[test]
    fn rejecting_pending_moves_nothing() {
        assert_eq!(Pending.transition_to(Rejected), Some(StockChange::Unchanged));
    }

    #[test]
    fn returning_or_rejecting_approved_checks_stock_in() {
        assert_eq!(Approved.transition_to(Returned), Some(StockChange::CheckIn));
        assert_eq!(Approved.transition_to(Rejected), Some(StockChange::CheckIn));
    }

    #[test]
    fn same_status_is_a_no_op() {
        for status in [Pending, Approved, Rejected, Returned] {
            assert_eq!(status.transition_to(status), Some(StockChange::Unchanged));
        }
    }

    #[test]
    fn closed_borrowings_cannot_move() {
        for next in [Pending, Approved, Rejected] {
            assert_eq!(Returned.transition_to(next), None);
        }
        for next in [Pending, Approved, Returned] {
            assert_eq!(Rejected.transition_to(next), None);
        }
        assert_eq!(Pending.transition_to(Returned), None);
        assert_eq!(Approved.transition_to(Pending), None);
    }

    #[test]
    fn only_approved_holds_stock() {
        assert!(Approved.holds_stock());
        assert!(!Pending.holds_stock());
        assert!(!Returned.holds_stock());
    }

    #[test]
    fn create_request_parses_dates() {
        let req: BorrowingCreateRequest = serde_json::from_str(
            r#"{"item_id": 1, "quantity": 2, "borrow_date": "2024-03-01",
                "return_date": "2024-03-08", "purpose": "Praktikum"}"#,
        )
        .unwrap();
        assert_eq!(req.borrow_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(req.borrower_id, None);
    }

    #[test]
    fn create_request_requires_positive_quantity_and_purpose() {
        let req: BorrowingCreateRequest = serde_json::from_str(
            r#"{"item_id": 1, "quantity": 0, "borrow_date": "2024-03-01", "purpose": "   "}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        let mut fields: Vec<_> = errors.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        assert_eq!(fields, ["purpose", "quantity", "return_date"]);
    }
}
