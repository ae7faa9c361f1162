use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use chrono::{Duration, Local};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use poem::Request;
use poem_openapi::{auth::Bearer, SecurityScheme};
use redis::ConnectionLike;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::error::AppError, model::user::User, repository::user::get_user_by_id, settings::Config,
    AppState,
};

use super::session::get_session;

/// password hashing
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string();
    Ok(password_hash)
}

/// password hash verification
pub fn verify_hash_password(
    password: &str,
    password_hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(password_hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}


struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    /// `access` or `refresh`
    pub type_key: String,
}

impl Claims {
    pub fn access(user: &User, config: &Config) -> Self {
        Self::new(user, "access", config.jwt_exp)
    }

    pub fn refresh(user: &User, config: &Config) -> Self {
        Self::new(user, "refresh", config.jwt_refresh_exp)
    }

    fn new(user: &User, type_key: &str, minutes: u16) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.to_string(),
            exp: (Local::now() + Duration::minutes(minutes as i64)).timestamp(),
            type_key: type_key.to_string(),
        }
    }
}

pub fn encode_token(claims: &Claims, jwt_secret: &str) -> anyhow::Result<String> {
    let keys = Keys::new(jwt_secret.as_bytes());
    Ok(encode(&Header::default(), &claims, &keys.encoding)?)
}

/// Extract payload and validate token
pub fn decode_token(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let keys = Keys::new(jwt_secret.as_bytes());
    let token_data = decode::<Claims>(token, &keys.decoding, &Validation::default())?;
    Ok(token_data.claims)
}

pub fn generate_token_from_user(user: &User, config: &Config) -> anyhow::Result<String> {
    encode_token(&Claims::access(user, config), &config.jwt_secret)
}

pub fn generate_refresh_token_from_user(user: &User, config: &Config) -> anyhow::Result<String> {
    encode_token(&Claims::refresh(user, config), &config.jwt_secret)
}

/// Resolve the user behind an access token through its redis session.
pub async fn get_user_from_token<C: ConnectionLike>(
    tx: &mut Transaction<'_, Postgres>,
    redis_conn: &mut C,
    jwt_token: Option<String>,
) -> anyhow::Result<Option<User>> {
    let jwt_token = match jwt_token {
        Some(val) => val,
        None => return Ok(None),
    };
    let session = match get_session(redis_conn, jwt_token)? {
        Some(val) => val,
        None => return Ok(None),
    };
    let user_id = Uuid::parse_str(&session.user_id)?;
    get_user_by_id(tx, &user_id).await
}

pub async fn get_user_from_refresh_token(
    tx: &mut Transaction<'_, Postgres>,
    refresh_token: &str,
    config: &Config,
) -> anyhow::Result<Option<User>> {
    let claims = match decode_token(refresh_token, &config.jwt_secret) {
        Ok(val) => val,
        Err(_) => return Ok(None),
    };
    if claims.type_key != "refresh" {
        return Ok(None);
    }
    let user_id = Uuid::parse_str(&claims.id)?;
    get_user_by_id(tx, &user_id).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserApiKey {
    pub token: Option<String>,
}

/// Bearer authorization
#[derive(SecurityScheme)]
#[oai(ty = "bearer", checker = "bearer_checker")]
pub struct BearerAuthorization(pub UserApiKey);

pub async fn bearer_checker(_req: &Request, api_key: Bearer) -> Option<UserApiKey> {
    Some(UserApiKey {
        token: Some(api_key.token),
    })
}

/// Open a transaction and resolve the calling user. Inactive users are
/// treated as signed out.
pub async fn authenticate(
    state: &AppState,
    auth: &BearerAuthorization,
    module: &'static str,
    function: &'static str,
) -> Result<(Transaction<'static, Postgres>, User), AppError> {
    authenticate_token(state, auth.0.token.clone(), module, function).await
}

/// Same as [`authenticate`] for a token taken from somewhere other than the
/// `Authorization` header.
pub async fn authenticate_token(
    state: &AppState,
    token: Option<String>,
    module: &'static str,
    function: &'static str,
) -> Result<(Transaction<'static, Postgres>, User), AppError> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|err| AppError::internal(module, function, "begin transaction", err))?;
    let mut redis_conn = state
        .redis_conn
        .get()
        .map_err(|err| AppError::internal(module, function, "get redis pool connection", err))?;
    let user = get_user_from_token(&mut tx, &mut redis_conn, token)
        .await
        .map_err(|err| AppError::internal(module, function, "get user from token", err))?;
    match user {
        Some(user) if user.is_active => Ok((tx, user)),
        _ => Err(AppError::Unauthorized),
    }
}

pub fn require_hr_admin(user: &User) -> Result<(), AppError> {
    if user.role.is_hr_admin() {
        Ok(())
    } else {
        Err(AppError::insufficient_permissions())
    }
}
