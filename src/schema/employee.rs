use std::collections::BTreeMap;

use chrono::NaiveDate;
use poem_openapi::{payload::Json, types::multipart::Upload, ApiResponse, Multipart, Object};
use serde::Deserialize;
use serde_json::Value;

use super::common::DataResponse;

#[derive(Object, Deserialize)]
pub struct EmployeeCreateRequest {
    #[oai(validator(min_length = 1, max_length = 100))]
    pub first_name: String,
    #[oai(validator(min_length = 1, max_length = 100))]
    pub last_name: String,
    #[oai(validator(min_length = 1, max_length = 20))]
    pub ssn: String,
    #[oai(validator(max_length = 255))]
    pub email: Option<String>,
    #[oai(validator(max_length = 50))]
    pub mobile: Option<String>,
    pub rank: Option<String>,
    pub gender: Option<String>,
    pub town_district: Option<String>,
    pub stena_date: Option<String>,
    pub omc_date: Option<String>,
    pub pe3_date: Option<String>,
    pub comments: Option<String>,
    /// Values keyed by custom column name
    pub custom_fields: Option<BTreeMap<String, Value>>,
}

/// Inline cell edits keyed by column name.
#[derive(Object, Deserialize)]
pub struct CellEditRequest {
    pub changes: BTreeMap<String, Value>,
}

#[derive(Object, Deserialize)]
pub struct TerminateRequest {
    pub termination_date: NaiveDate,
    #[oai(validator(max_length = 1000))]
    pub termination_reason: Option<String>,
}

#[derive(Multipart)]
pub struct CsvUpload {
    pub file: Upload,
}

#[derive(ApiResponse)]
pub enum EmployeeCreateResponses {
    #[oai(status = 201)]
    Created(Json<DataResponse<Value>>),
}
