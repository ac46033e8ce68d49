use serde::{Deserialize, Deserializer};

pub mod borrowing;
pub mod file;
pub mod item;
pub mod pagination;
pub mod user;

pub use borrowing::{Borrowing, BorrowingDetail, BorrowingStatus, StockChange};
pub use file::{FileKind, FileRecord, ReferenceTable};
pub use item::Item;
pub use pagination::{PageQuery, Pagination};
pub use user::{Role, User, UserStatus};

/// Optional string with surrounding whitespace removed, so `length(min = 1)` rejects blanks.
pub fn trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(|s| s.trim().to_string()))
}
