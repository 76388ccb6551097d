//! DTOs shared across route modules.

use gp_core::db::Page;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pagination metadata included with every paginated response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

/// A paginated response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paged<T> {
    /// Builds the envelope from a repository page, converting items.
    pub fn from_page<U, F>(page: Page<U>, f: F) -> Self
    where
        F: FnMut(U) -> T,
    {
        let pagination = PageInfo {
            page: page.page,
            per_page: page.per_page,
            total_items: page.total,
            total_pages: page.total_pages,
        };
        Self {
            data: page.items.into_iter().map(f).collect(),
            pagination,
        }
    }
}

/// Deserializer for `Option<Option<T>>` update fields: an absent field
/// stays `None` (leave unchanged), an explicit `null` becomes
/// `Some(None)` (clear the value).
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DatabaseHealth,
    pub uptime_seconds: u64,
}

/// Database health details.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gp_core::db::PageRequest;

    #[test]
    fn envelope_carries_metadata() {
        let page = Page::new(vec![1, 2, 3], 10, &PageRequest::new(2, 3));
        let paged = Paged::from_page(page, |n| n.to_string());

        assert_eq!(paged.data, vec!["1", "2", "3"]);
        assert_eq!(paged.pagination.page, 2);
        assert_eq!(paged.pagination.total_items, 10);
        assert_eq!(paged.pagination.total_pages, 4);
    }
}
