use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

/// Return page `page` (1-based) of `items`, `page_size` items per page.
///
/// `page` 0 is treated as the first page and `page_size` 0 as 1.  A page past
/// the end is empty and reports a previous page whenever `items` is not.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> (&[T], PageInfo) {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let start = (page - 1).saturating_mul(page_size);

    if start >= items.len() {
        let info = PageInfo {
            has_previous_page: !items.is_empty(),
            has_next_page: false,
        };
        return (&items[..0], info);
    }

    let end = start.saturating_add(page_size).min(items.len());
    let info = PageInfo {
        has_previous_page: page > 1,
        has_next_page: end < items.len(),
    };
    (&items[start..end], info)
}
