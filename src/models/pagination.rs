use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Saturates instead of overflowing; a page far past the end is simply empty.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    pub fn paginate(&self, total: i64) -> Pagination {
        let limit = self.limit();
        Pagination {
            page: self.page(),
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<i64>, limit: Option<i64>) -> PageQuery {
        PageQuery { page, limit }
    }

    #[test]
    fn defaults_to_first_page_of_ten() {
        let q = query(None, None);
        assert_eq!((q.page(), q.limit(), q.offset()), (1, 10, 0));
    }

    #[test]
    fn clamps_out_of_range_values() {
        let q = query(Some(0), Some(1000));
        assert_eq!((q.page(), q.limit()), (1, MAX_LIMIT));

        let q = query(Some(-3), Some(0));
        assert_eq!((q.page(), q.limit()), (1, 1));
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(query(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let q = actix_web::web::Query::<PageQuery>::from_query("page=9223372036854775807&limit=100")
            .unwrap()
            .into_inner();
        assert_eq!(q.page(), i64::MAX);
        assert_eq!(q.offset(), i64::MAX);
        assert_eq!(query(Some(i64::MAX), None).paginate(3).total_pages, 1);
    }

    #[test]
    fn total_pages_rounds_up() {
        let q = query(Some(2), Some(10));
        assert_eq!(
            q.paginate(21),
            Pagination { page: 2, limit: 10, total: 21, total_pages: 3 }
        );
        assert_eq!(q.paginate(0).total_pages, 0);
        assert_eq!(q.paginate(10).total_pages, 1);
    }

    #[test]
    fn serializes_total_pages_in_camel_case() {
        let json = serde_json::to_value(query(None, None).paginate(5)).unwrap();
        assert_eq!(json["totalPages"], 1);
    }
}
