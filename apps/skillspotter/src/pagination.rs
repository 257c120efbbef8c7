use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// One page of results, whether it came from the backend or was cut locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Page<T> {
    pub fn empty(message: impl Into<String>) -> Self {
        Page {
            items: Vec::new(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            total_pages: 0,
            total_results: 0,
            message: Some(message.into()),
        }
    }
}

/// Slices `items` to the requested 1-based page. Out-of-range pages are empty,
/// and `page`/`limit` of zero fall back to the defaults.
pub fn paginate<T>(items: Vec<T>, page: Option<u32>, limit: Option<u32>) -> Page<T> {
    let page = page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
    let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
    let total_results = items.len();
    let total_pages = total_results.div_ceil(limit as usize) as u32;

    let start = (page as usize - 1).saturating_mul(limit as usize);
    let items = items
        .into_iter()
        .skip(start)
        .take(limit as usize)
        .collect();

    Page {
        items,
        page,
        limit,
        total_pages,
        total_results,
        message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_defaults() {
        let page = paginate((1..=25).collect::<Vec<_>>(), None, None);
        assert_eq!(page.items, (1..=10).collect::<Vec<_>>());
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_results, 25);
    }

    #[test]
    fn test_last_partial_page() {
        let page = paginate((1..=25).collect::<Vec<_>>(), Some(3), Some(10));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let page = paginate(vec![1, 2, 3], Some(5), Some(2));
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn test_zero_page_and_limit_use_defaults() {
        let page = paginate(vec![1, 2, 3], Some(0), Some(0));
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 10);
        assert_eq!(page.items.len(), 3);
    }

    #[test]
    fn test_empty_input() {
        let page: Page<u8> = paginate(vec![], None, None);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_results, 0);
    }
}
