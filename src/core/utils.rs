use chrono::{DateTime, FixedOffset, NaiveDate};
use uuid::Uuid;

use crate::{core::error::AppError, schema::common::PageMeta};

pub fn datetime_to_string(datetime: DateTime<FixedOffset>) -> String {
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn datetime_to_string_opt(datetime: Option<DateTime<FixedOffset>>) -> Option<String> {
    datetime.map(datetime_to_string)
}

pub fn date_to_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Path ids that are not uuids cannot exist, so they read as not found.
pub fn parse_id(value: &str, entity: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim()).map_err(|_| AppError::NotFound(entity.to_string()))
}

/// Page and page size from optional query params, clamped to sane bounds.
pub fn page_params(page: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(50).clamp(1, 500);
    (page, page_size)
}

pub fn page_meta(counts: u32, page: u32, page_size: u32) -> PageMeta {
    PageMeta {
        counts,
        page,
        page_count: counts.div_ceil(page_size),
        page_size,
    }
}
