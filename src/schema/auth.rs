use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use super::user::DetailUser;

#[derive(Object, Deserialize)]
pub struct LoginRequest {
    #[oai(validator(min_length = 3, max_length = 255))]
    pub email: String,
    #[oai(validator(min_length = 1))]
    pub password: String,
}

#[derive(Object, Deserialize, Serialize)]
pub struct LoginResponse {
    pub exp: String,
    pub exp_in: i64,
    pub exp_refresh_token: String,
    pub refresh_token: String,
    pub token: String,
    pub token_type: String,
    pub user: DetailUser,
}

#[derive(Object, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}
