use poem_openapi::{payload::Json, ApiResponse, Object};
use serde::{Deserialize, Serialize};

use super::common::DataResponse;
use crate::{core::utils::datetime_to_string_opt, model::important_date::ImportantDate};

#[derive(Object, Deserialize, Serialize, Debug, Clone)]
pub struct DetailImportantDate {
    pub id: String,
    pub week_number: i32,
    pub year: i32,
    pub category: String,
    pub description: Option<String>,
    pub date_value: String,
    pub notes: Option<String>,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
}

impl From<&ImportantDate> for DetailImportantDate {
    fn from(data: &ImportantDate) -> Self {
        Self {
            id: data.id.to_string(),
            week_number: data.week_number,
            year: data.year,
            category: data.category.clone(),
            description: data.description.clone(),
            date_value: data.date_value.clone(),
            notes: data.notes.clone(),
            created_date: datetime_to_string_opt(data.created_date),
            updated_date: datetime_to_string_opt(data.updated_date),
        }
    }
}

#[derive(Object, Deserialize)]
pub struct ImportantDateRequest {
    #[oai(validator(minimum(value = "1"), maximum(value = "53")))]
    pub week_number: i32,
    #[oai(validator(minimum(value = "1900"), maximum(value = "2200")))]
    pub year: i32,
    #[oai(validator(min_length = 1, max_length = 100))]
    pub category: String,
    pub description: Option<String>,
    #[oai(validator(min_length = 1, max_length = 100))]
    pub date_value: String,
    pub notes: Option<String>,
}

#[derive(ApiResponse)]
pub enum ImportantDateCreateResponses {
    #[oai(status = 201)]
    Created(Json<DataResponse<DetailImportantDate>>),
}
