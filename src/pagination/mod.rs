//! Pagination contract shared by every list endpoint.
//!
//! Normalizes untrusted page/limit/sort/order query parameters into a
//! deterministic fetch window and produces the uniform pagination envelope.

use serde::{Deserialize, Serialize};

/// Default page size when the caller supplies none.
pub const DEFAULT_LIMIT: i64 = 10;
/// Upper bound on page size; no request performs unbounded work.
pub const MAX_LIMIT: i64 = 100;

/// Raw, string-typed pagination query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Normalized fetch window.
#[derive(Debug, Clone)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
    pub sort: String,
    pub order: Order,
}

impl PageParams {
    /// Normalize raw query parameters.
    ///
    /// `default_sort` is `"createdAt"` for most collections and `"position"`
    /// for owner-scoped ordered lists.
    pub fn from_query(query: &PageQuery, default_sort: &str) -> Self {
        let page = query
            .page
            .as_deref()
            .and_then(|p| p.parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);

        let limit = query
            .limit
            .as_deref()
            .and_then(|l| l.parse::<i64>().ok())
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);

        let sort = query
            .sort
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_sort.to_string());

        // "asc" only for the literal string, anything else is descending
        let order = match query.order.as_deref() {
            Some("asc") => Order::Asc,
            _ => Order::Desc,
        };

        Self {
            page,
            limit,
            sort,
            order,
        }
    }

    /// Number of rows to skip for the current page.
    pub fn skip(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Pagination result envelope.
///
/// `hasNext`/`hasPrev` are pure functions of `page` and `pages`, computed from
/// the same `total` used to build `pages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(params: &PageParams, total: i64) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + params.limit - 1) / params.limit
        };

        Self {
            page: params.page,
            limit: params.limit,
            total,
            pages,
            has_next: params.page < pages,
            has_prev: params.page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(String::from),
            limit: limit.map(String::from),
            sort: None,
            order: None,
        }
    }

    #[test]
    fn test_defaults() {
        let params = PageParams::from_query(&PageQuery::default(), "createdAt");
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 10);
        assert_eq!(params.sort, "createdAt");
        assert_eq!(params.order, Order::Desc);
        assert_eq!(params.skip(), 0);
    }

    #[test]
    fn test_page_floor_and_limit_clamp() {
        let params = PageParams::from_query(&query(Some("0"), Some("500")), "createdAt");
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 100);

        let params = PageParams::from_query(&query(Some("-3"), Some("0")), "createdAt");
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 1);
    }

    #[test]
    fn test_garbage_input_falls_back() {
        let params = PageParams::from_query(&query(Some("abc"), Some("xyz")), "position");
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 10);
        assert_eq!(params.sort, "position");
    }

    #[test]
    fn test_order_is_asc_only_for_literal_asc() {
        for (input, expected) in [
            (Some("asc"), Order::Asc),
            (Some("ASC"), Order::Desc),
            (Some("ascending"), Order::Desc),
            (Some("desc"), Order::Desc),
            (None, Order::Desc),
        ] {
            let q = PageQuery {
                order: input.map(String::from),
                ..PageQuery::default()
            };
            assert_eq!(PageParams::from_query(&q, "createdAt").order, expected);
        }
    }

    #[test]
    fn test_envelope_25_over_10() {
        let mut params = PageParams::from_query(&PageQuery::default(), "createdAt");
        let p1 = Pagination::new(&params, 25);
        assert_eq!(p1.pages, 3);
        assert!(p1.has_next);
        assert!(!p1.has_prev);

        params.page = 3;
        let p3 = Pagination::new(&params, 25);
        assert!(!p3.has_next);
        assert!(p3.has_prev);
    }

    #[test]
    fn test_envelope_empty_total() {
        let params = PageParams::from_query(&PageQuery::default(), "createdAt");
        let p = Pagination::new(&params, 0);
        assert_eq!(p.pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn test_envelope_page_beyond_last_keeps_has_prev() {
        let params = PageParams::from_query(&query(Some("5"), None), "createdAt");
        let p = Pagination::new(&params, 25);
        assert_eq!(p.pages, 3);
        assert!(!p.has_next);
        assert!(p.has_prev);
    }

    #[test]
    fn test_skip_window() {
        let params = PageParams::from_query(&query(Some("3"), Some("20")), "createdAt");
        assert_eq!(params.skip(), 40);
    }
}
