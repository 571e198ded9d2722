//! Filter, sort and slice a result list into a page.

use planning_pulse_search_models::{Application, Page, SearchFilters, SortOrder};

use crate::filter::filter_applications;
use crate::sort::sort_applications;

/// Filters, sorts and paginates `applications`.
///
/// `page` is zero-based. A `page_size` of zero is treated as one. Pages
/// past the end return no items but still report the totals.
#[must_use]
pub fn apply(
    applications: &[Application],
    filters: &SearchFilters,
    sort: Option<SortOrder>,
    page: usize,
    page_size: usize,
) -> Page<Application> {
    let mut filtered = filter_applications(applications, filters);
    sort_applications(&mut filtered, sort);
    paginate(filtered, page, page_size)
}

/// Slices an already ordered list.
#[must_use]
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_count = items.len();
    let total_pages = total_count.div_ceil(page_size).max(1);

    let items = items
        .into_iter()
        .skip(page.saturating_mul(page_size))
        .take(page_size)
        .collect();

    Page {
        items,
        total_count,
        total_pages,
        page,
        page_size,
    }
}
