use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use sqlx::prelude::FromRow;
use uuid::Uuid;

pub const TABLE_NAME: &str = "public.important_date";

pub const CSV_HEADERS: [&str; 6] = [
    "week_number",
    "year",
    "category",
    "description",
    "date_value",
    "notes",
];

#[derive(Clone, Debug, Deserialize, FromRow, PartialEq)]
pub struct ImportantDate {
    pub id: Uuid,
    pub week_number: i32,
    pub year: i32,
    pub category: String,
    pub description: Option<String>,
    pub date_value: String,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_date: Option<DateTime<FixedOffset>>,
    pub updated_date: Option<DateTime<FixedOffset>>,
}

impl ImportantDate {
    pub fn csv_record(&self) -> Vec<String> {
        vec![
            self.week_number.to_string(),
            self.year.to_string(),
            self.category.clone(),
            self.description.clone().unwrap_or_default(),
            self.date_value.clone(),
            self.notes.clone().unwrap_or_default(),
        ]
    }
}
