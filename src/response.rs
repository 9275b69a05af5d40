use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct Meta {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub total: Option<u64>,
    pub pages: Option<u64>,
}

impl Meta {
    /// Page metadata; `pages` is `ceil(total / per_page)` and is 0 only when nothing matched.
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
            pages: Some(total.div_ceil(per_page.max(1))),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
            pages: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(Meta::new(1, 5, 11).pages, Some(3));
        assert_eq!(Meta::new(1, 5, 10).pages, Some(2));
        assert_eq!(Meta::new(1, 5, 1).pages, Some(1));
    }

    #[test]
    fn zero_matches_report_real_page_request() {
        let meta = Meta::new(1, 5, 0);
        assert_eq!(meta.pages, Some(0));
        assert_eq!(meta.page, Some(1));
        assert_eq!(meta.total, Some(0));
    }

    #[test]
    fn page_sizes_sum_to_total() {
        for total in 0..40u64 {
            for per_page in 1..8u64 {
                let pages = Meta::new(1, per_page, total).pages.unwrap();
                let summed: u64 = (1..=pages)
                    .map(|page| {
                        let offset = (page - 1) * per_page;
                        per_page.min(total - offset)
                    })
                    .sum();
                assert_eq!(summed, total, "total={total} per_page={per_page}");
            }
        }
    }
}
