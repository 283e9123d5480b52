//! Page slicing for list responses.

use serde::Serialize;

/// Position of a page within a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// 1-based page number.
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// One page of records plus its position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Slice `records` into the 1-based page `page` of `limit` items.
///
/// Pages past the end are empty. `page` and `limit` below 1 are raised to 1.
pub fn paginate<T>(records: Vec<T>, page: usize, limit: usize) -> Page<T> {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = records.len();
    let total_pages = total.div_ceil(limit);

    let start = (page - 1).saturating_mul(limit);
    let data = records.into_iter().skip(start).take(limit).collect();

    Page {
        data,
        pagination: PageInfo {
            page,
            limit,
            total,
            total_pages,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_and_last_page() {
        let items: Vec<u32> = (1..=10).collect();

        let page = paginate(items.clone(), 2, 4);
        assert_eq!(page.data, vec![5, 6, 7, 8]);
        assert_eq!(
            page.pagination,
            PageInfo {
                page: 2,
                limit: 4,
                total: 10,
                total_pages: 3
            }
        );

        let last = paginate(items, 3, 4);
        assert_eq!(last.data, vec![9, 10]);
    }

    #[test]
    fn test_out_of_range_page_is_empty() {
        let page = paginate(vec![1, 2, 3], 5, 2);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn test_empty_input() {
        let page = paginate(Vec::<u8>::new(), 1, 20);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total_pages, 0);
    }

    #[test]
    fn test_zero_page_and_limit_are_clamped() {
        let page = paginate(vec!['a', 'b', 'c'], 0, 0);
        assert_eq!(page.data, vec!['a']);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.limit, 1);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_serializes_camel_case() {
        let page = paginate(vec![1], 1, 10);
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["pagination"]["totalPages"], 1);
        assert_eq!(value["data"], serde_json::json!([1]));
    }
}
