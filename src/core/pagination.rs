use crate::config::{DEFAULT_PAGE, DEFAULT_PER_PAGE, MAX_PER_PAGE};
use crate::core::errors::ApiError;
use crate::core::query_params::{get_int, parse_query_params};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    /// Strict form used by the JSON API: `page < 1` and `per_page < 1` are
    /// client errors, oversized pages are clamped to [`MAX_PER_PAGE`].
    pub fn new(page: i64, per_page: i64) -> Result<Self, ApiError> {
        if page < 1 {
            return Err(ApiError::BadRequest("page must be 1 or greater".to_string()));
        }
        if per_page < 1 {
            return Err(ApiError::BadRequest("per_page must be 1 or greater".to_string()));
        }
        let page = usize::try_from(page)
            .map_err(|_| ApiError::BadRequest("page is out of range".to_string()))?;
        let per_page = usize::try_from(per_page).map_or(MAX_PER_PAGE, |n| n.min(MAX_PER_PAGE));
        Ok(PageRequest { page, per_page })
    }

    /// Lenient form used by the web pages: bad page numbers become page 1.
    pub fn clamped(page: i64, per_page: usize) -> Self {
        PageRequest {
            page: usize::try_from(page.max(1)).unwrap_or(usize::MAX),
            per_page: per_page.max(1),
        }
    }

    /// Reads `page` and `per_page` from a request URI for the API.
    pub fn from_uri(uri: &str) -> Result<Self, ApiError> {
        let params = parse_query_params(uri);
        Self::new(
            get_int(&params, "page", DEFAULT_PAGE),
            get_int(&params, "per_page", DEFAULT_PER_PAGE),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.per_page)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn next_num(&self) -> Option<usize> {
        self.has_next().then(|| self.page + 1)
    }

    pub fn prev_num(&self) -> Option<usize> {
        self.has_prev().then(|| self.page - 1)
    }
}

/// Cuts one page out of an already ordered result set.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total_items = items.len();
    let start = (request.page - 1).saturating_mul(request.per_page);
    let items = items.into_iter().skip(start).take(request.per_page).collect();

    Page {
        items,
        page: request.page,
        per_page: request.per_page,
        total_items,
    }
}
