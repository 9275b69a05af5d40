use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// 1-indexed page request as sent by clients. `page`/`per_page` are accepted as aliases.
#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    #[serde(alias = "page")]
    pub page_id: Option<u64>,
    #[serde(alias = "per_page")]
    pub page_size: Option<u64>,
}

/// A resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
    pub offset: u64,
}

impl PageRequest {
    pub fn resolve(page: Option<u64>, per_page: Option<u64>, default_size: u64, max_size: u64) -> Self {
        let per_page = per_page.unwrap_or(default_size).clamp(1, max_size.max(1));
        // The offset is bound as a signed 64-bit value.
        let last_page = i64::MAX as u64 / per_page + 1;
        let page = page.unwrap_or(1).clamp(1, last_page);
        let offset = (page - 1) * per_page;
        Self {
            page,
            per_page,
            offset,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    /// Case-insensitive substring matched against name or description.
    #[serde(alias = "name")]
    pub q: Option<String>,
    #[serde(alias = "page")]
    pub page_id: Option<u64>,
    #[serde(alias = "per_page")]
    pub page_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    #[serde(alias = "page")]
    pub page_id: Option<u64>,
    #[serde(alias = "per_page")]
    pub page_size: Option<u64>,
    pub sort_order: Option<SortOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_with_configured_size() {
        let page = PageRequest::resolve(None, None, 5, 100);
        assert_eq!(page, PageRequest { page: 1, per_page: 5, offset: 0 });
    }

    #[test]
    fn offset_follows_page_number() {
        let page = PageRequest::resolve(Some(3), Some(10), 5, 100);
        assert_eq!(page.offset, 20);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let page = PageRequest::resolve(Some(0), Some(0), 5, 100);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 1);

        let page = PageRequest::resolve(Some(2), Some(1000), 5, 100);
        assert_eq!(page.per_page, 100);
        assert_eq!(page.offset, 100);
    }

    #[test]
    fn huge_page_numbers_keep_the_offset_in_signed_range() {
        let page = PageRequest::resolve(Some(100_000_000_000_000_000), Some(100), 5, 100);
        assert!(page.offset <= i64::MAX as u64);
        assert_eq!(page.page, i64::MAX as u64 / 100 + 1);

        let page = PageRequest::resolve(Some(u64::MAX), Some(1), 5, 100);
        assert_eq!(page.offset, i64::MAX as u64);
    }
}
