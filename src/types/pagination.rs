use serde::Deserialize;

/// Common `?page=&pageSize=` query parameters.
///
/// Every list endpoint resolves these against the configured defaults:
/// page is floored at 1, pageSize falls back to the default and is clamped
/// to the configured maximum.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

impl PageQuery {
    pub fn resolve(&self, default_size: i64, max_size: i64) -> (i64, i64) {
        let page = match self.page {
            Some(p) if p >= 1 => p,
            _ => 1,
        };
        let mut size = match self.page_size {
            Some(s) if s >= 1 => s,
            _ => default_size,
        };
        if size > max_size {
            size = max_size;
        }
        (page, size)
    }

    pub fn offset(page: i64, size: i64) -> i64 {
        (page - 1) * size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_absent() {
        let q = PageQuery::default();
        assert_eq!(q.resolve(20, 100), (1, 20));
    }

    #[test]
    fn clamps_oversized_page_size() {
        let q = PageQuery {
            page: Some(2),
            page_size: Some(500),
        };
        assert_eq!(q.resolve(20, 100), (2, 100));
    }

    #[test]
    fn floors_invalid_page() {
        let q = PageQuery {
            page: Some(0),
            page_size: Some(0),
        };
        assert_eq!(q.resolve(20, 100), (1, 20));
    }

    #[test]
    fn offset_math() {
        assert_eq!(PageQuery::offset(1, 20), 0);
        assert_eq!(PageQuery::offset(3, 50), 100);
    }
}
