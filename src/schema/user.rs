use poem_openapi::{payload::Json, ApiResponse, Object};
use serde::{Deserialize, Serialize};

use super::common::{AuditUser, DataResponse};
use crate::{
    core::utils::datetime_to_string_opt,
    model::{role::UserRole, user::User},
};

#[derive(Object, Deserialize, Serialize, Debug, Clone)]
pub struct DetailUser {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_date: Option<String>,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
    pub created_by: Option<AuditUser>,
    pub updated_by: Option<AuditUser>,
}

impl DetailUser {
    pub fn new(user: &User, created_by: Option<&User>, updated_by: Option<&User>) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            is_active: user.is_active,
            last_login_date: datetime_to_string_opt(user.last_login_date),
            created_date: datetime_to_string_opt(user.created_date),
            updated_date: datetime_to_string_opt(user.updated_date),
            created_by: created_by.map(AuditUser::from),
            updated_by: updated_by.map(AuditUser::from),
        }
    }
}

impl From<&User> for AuditUser {
    fn from(user: &User) -> Self {
        AuditUser {
            id: user.id.to_string(),
            email: user.email.clone(),
        }
    }
}

#[derive(Object, Deserialize)]
pub struct UserCreateRequest {
    #[oai(validator(min_length = 3, max_length = 255, pattern = r"^[^@\s]+@[^@\s]+$"))]
    pub email: String,
    #[oai(validator(min_length = 8, max_length = 128))]
    pub password: String,
    #[oai(validator(max_length = 255))]
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: Option<bool>,
}

#[derive(Object, Deserialize)]
pub struct UserUpdateRequest {
    #[oai(validator(min_length = 3, max_length = 255, pattern = r"^[^@\s]+@[^@\s]+$"))]
    pub email: Option<String>,
    #[oai(validator(min_length = 8, max_length = 128))]
    pub password: Option<String>,
    #[oai(validator(max_length = 255))]
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(ApiResponse)]
pub enum UserCreateResponses {
    #[oai(status = 201)]
    Created(Json<DataResponse<DetailUser>>),
}
