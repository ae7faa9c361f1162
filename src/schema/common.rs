use poem_openapi::{
    payload::Json,
    types::{ParseFromJSON, ToJSON},
    ApiResponse, Object,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Object, Deserialize, Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[oai(skip_serializing_if_is_none)]
    pub details: Option<Value>,
}

#[derive(Object, Deserialize, Serialize, Debug)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(ApiResponse, Debug)]
pub enum ApiError {
    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorResponse>),

    #[oai(status = 403)]
    Forbidden(Json<ErrorResponse>),

    #[oai(status = 404)]
    NotFound(Json<ErrorResponse>),

    #[oai(status = 409)]
    Conflict(Json<ErrorResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<ErrorResponse>),
}

#[derive(Object, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PageMeta {
    pub counts: u32,
    pub page: u32,
    pub page_count: u32,
    pub page_size: u32,
}

/// Success envelope: `{ data, meta? }`.
#[derive(Object, Deserialize, Serialize)]
pub struct DataResponse<T: ParseFromJSON + ToJSON> {
    pub data: T,
    #[oai(skip_serializing_if_is_none)]
    pub meta: Option<PageMeta>,
}

impl<T: ParseFromJSON + ToJSON> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data, meta: None }
    }

    pub fn paginated(data: T, meta: PageMeta) -> Self {
        Self {
            data,
            meta: Some(meta),
        }
    }
}

#[derive(ApiResponse)]
pub enum NoContentResponses {
    #[oai(status = 204)]
    NoContent,
}

#[derive(Object, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ImportRowError {
    /// 1-based data row number (header excluded)
    pub row: u32,
    pub message: String,
}

#[derive(Object, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ImportResult {
    pub imported: u32,
    pub skipped: u32,
    pub errors: Vec<ImportRowError>,
    /// CSV of the failed rows with an extra `error` column
    #[oai(skip_serializing_if_is_none)]
    pub error_report: Option<String>,
}

#[derive(Object, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AuditUser {
    pub id: String,
    pub email: String,
}
