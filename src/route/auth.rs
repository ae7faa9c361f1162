use std::sync::Arc;

use chrono::{Duration, Local};
use poem::web::{cookie::CookieJar, Data};
use poem_openapi::{payload::Json, OpenApi, Tags};

use crate::{
    core::{
        error::AppError,
        gate::{clear_session_cookie, session_cookie},
        security::{
            authenticate, generate_refresh_token_from_user, generate_token_from_user,
            get_user_from_refresh_token, verify_hash_password, BearerAuthorization,
        },
        session::{add_session, remove_session},
    },
    model::user::User,
    repository::user::{get_user_by_email, update_last_login},
    schema::{
        auth::{LoginRequest, LoginResponse, RefreshTokenRequest},
        common::{ApiError, DataResponse, NoContentResponses},
        user::DetailUser,
    },
    settings::{get_config, Config},
    AppState,
};

#[derive(Tags)]
enum ApiAuthTags {
    Auth,
}

pub struct ApiAuth;

/// Issue a token pair for `user`, store the session and set the cookie.
fn start_session(
    state: &AppState,
    user: &User,
    config: &Config,
    cookie_jar: &CookieJar,
    function: &'static str,
) -> Result<LoginResponse, AppError> {
    let token = generate_token_from_user(user, config)
        .map_err(|err| AppError::internal("route.auth", function, "generate token", err))?;
    let refresh_token = generate_refresh_token_from_user(user, config)
        .map_err(|err| AppError::internal("route.auth", function, "generate refresh token", err))?;
    let mut redis_conn = state
        .redis_conn
        .get()
        .map_err(|err| AppError::internal("route.auth", function, "get redis pool connection", err))?;
    add_session(
        &mut redis_conn,
        user,
        config,
        token.clone(),
        refresh_token.clone(),
    )
    .map_err(|err| AppError::internal("route.auth", function, "add_session to redis", err))?;
    cookie_jar.add(session_cookie(
        &token,
        config.session_ttl(),
        config.cookie_secure.unwrap_or(false),
    ));

    let now = Local::now();
    let exp = now + Duration::minutes(config.jwt_exp as i64);
    let exp_refresh_token = now + Duration::minutes(config.jwt_refresh_exp as i64);
    Ok(LoginResponse {
        exp: exp.format("%Y-%m-%d %H:%M:%S").to_string(),
        exp_in: config.jwt_exp as i64 * 60,
        exp_refresh_token: exp_refresh_token.format("%Y-%m-%d %H:%M:%S").to_string(),
        refresh_token,
        token,
        token_type: "Bearer".to_string(),
        user: DetailUser::new(user, None, None),
    })
}

#[OpenApi]
impl ApiAuth {
    #[oai(path = "/auth/login", method = "post", tag = "ApiAuthTags::Auth")]
    async fn auth_login(
        &self,
        json: Json<LoginRequest>,
        state: Data<&Arc<AppState>>,
        cookie_jar: &CookieJar,
    ) -> Result<Json<DataResponse<LoginResponse>>, ApiError> {
        let config = get_config()
            .map_err(|err| AppError::internal("route.auth", "auth_login", "load config", err))?;
        let mut tx = state
            .db
            .begin()
            .await
            .map_err(|err| AppError::internal("route.auth", "auth_login", "begin transaction", err))?;

        let user = get_user_by_email(&mut tx, &json.email)
            .await
            .map_err(|err| {
                AppError::internal("route.auth", "auth_login", "check user on database", err)
            })?
            .ok_or(AppError::validation("Invalid credentials"))?;
        let is_valid = verify_hash_password(&json.password, &user.password).map_err(|err| {
            AppError::internal(
                "route.auth",
                "auth_login",
                "validate user password",
                anyhow::anyhow!("{}", err),
            )
        })?;
        if !is_valid {
            return Err(AppError::validation("Invalid credentials").into());
        }
        if !user.is_active {
            return Err(AppError::Forbidden("Account is deactivated".to_string()).into());
        }

        let mut user = user;
        let now = Local::now().fixed_offset();
        update_last_login(&mut tx, &mut user, &now)
            .await
            .map_err(|err| {
                AppError::internal("route.auth", "auth_login", "update last login", err)
            })?;
        let response = start_session(&state, &user, &config, cookie_jar, "auth_login")?;
        tx.commit()
            .await
            .map_err(|err| AppError::internal("route.auth", "auth_login", "commit transaction", err))?;
        tracing::info!(user_id = %user.id, "user logged in");
        Ok(Json(DataResponse::new(response)))
    }

    #[oai(
        path = "/auth/refresh-token",
        method = "post",
        tag = "ApiAuthTags::Auth"
    )]
    async fn auth_refresh_token(
        &self,
        json: Json<RefreshTokenRequest>,
        state: Data<&Arc<AppState>>,
        cookie_jar: &CookieJar,
    ) -> Result<Json<DataResponse<LoginResponse>>, ApiError> {
        let config = get_config().map_err(|err| {
            AppError::internal("route.auth", "auth_refresh_token", "load config", err)
        })?;
        let mut tx = state.db.begin().await.map_err(|err| {
            AppError::internal("route.auth", "auth_refresh_token", "begin transaction", err)
        })?;
        let user = get_user_from_refresh_token(&mut tx, &json.refresh_token, &config)
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.auth",
                    "auth_refresh_token",
                    "get user from refresh token",
                    err,
                )
            })?;
        let user = match user {
            Some(user) if user.is_active => user,
            _ => return Err(AppError::Unauthorized.into()),
        };
        let response = start_session(&state, &user, &config, cookie_jar, "auth_refresh_token")?;
        Ok(Json(DataResponse::new(response)))
    }

    #[oai(path = "/auth/logout", method = "post", tag = "ApiAuthTags::Auth")]
    async fn auth_logout(
        &self,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
        cookie_jar: &CookieJar,
    ) -> Result<NoContentResponses, ApiError> {
        let (_, _user) = authenticate(&state, &auth, "route.auth", "auth_logout").await?;
        let mut redis_conn = state.redis_conn.get().map_err(|err| {
            AppError::internal("route.auth", "auth_logout", "get redis pool connection", err)
        })?;
        if let Some(token) = auth.0.token.clone() {
            remove_session(&mut redis_conn, token).map_err(|err| {
                AppError::internal("route.auth", "auth_logout", "remove session", err)
            })?;
        }
        clear_session_cookie(cookie_jar);
        Ok(NoContentResponses::NoContent)
    }

    #[oai(path = "/auth/me", method = "get", tag = "ApiAuthTags::Auth")]
    async fn auth_me(
        &self,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailUser>>, ApiError> {
        let (_, user) = authenticate(&state, &auth, "route.auth", "auth_me").await?;
        Ok(Json(DataResponse::new(DetailUser::new(&user, None, None))))
    }
}
