use std::sync::Arc;

use chrono::Local;
use poem::web::Data;
use poem_openapi::{
    param::{Path, Query},
    payload::Json,
    OpenApi, Tags,
};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::{
        error::AppError,
        security::{authenticate, hash_password, require_hr_admin, BearerAuthorization},
        session::remove_user_sessions,
        utils::{page_meta, page_params, parse_id},
    },
    model::{role::UserRole, user::User},
    repository::user::{
        create_user, get_all_user, get_user_by_email, get_user_by_id, update_user, UserFilters,
    },
    schema::{
        common::{ApiError, DataResponse},
        user::{DetailUser, UserCreateRequest, UserCreateResponses, UserUpdateRequest},
    },
    AppState,
};

#[derive(Tags)]
enum ApiUserTags {
    User,
}

pub struct ApiUser;

async fn detail_user(
    tx: &mut Transaction<'_, Postgres>,
    user: &User,
    function: &'static str,
) -> Result<DetailUser, AppError> {
    let mut audit = vec![];
    for id in [user.created_by, user.updated_by] {
        let audit_user = match id {
            Some(id) => get_user_by_id(tx, &id).await.map_err(|err| {
                AppError::internal("route.user", function, "get audit user", err)
            })?,
            None => None,
        };
        audit.push(audit_user);
    }
    Ok(DetailUser::new(user, audit[0].as_ref(), audit[1].as_ref()))
}

async fn find_user(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    function: &'static str,
) -> Result<User, AppError> {
    let id = parse_id(id, "User")?;
    get_user_by_id(tx, &id)
        .await
        .map_err(|err| AppError::internal("route.user", function, "get user by id", err))?
        .ok_or(AppError::NotFound("User".to_string()))
}

async fn set_active(
    state: &AppState,
    auth: &BearerAuthorization,
    id: &str,
    is_active: bool,
    function: &'static str,
) -> Result<DetailUser, AppError> {
    let (mut tx, request_user) = authenticate(state, auth, "route.user", function).await?;
    require_hr_admin(&request_user)?;
    let mut user = find_user(&mut tx, id, function).await?;
    if !is_active && user.id == request_user.id {
        return Err(AppError::validation("You cannot deactivate your own account"));
    }
    user.is_active = is_active;
    let now = Local::now().fixed_offset();
    update_user(&mut tx, &mut user, &request_user, &now)
        .await
        .map_err(|err| AppError::internal("route.user", function, "update user", err))?;
    if !is_active {
        // forced sign-out everywhere
        let mut redis_conn = state.redis_conn.get().map_err(|err| {
            AppError::internal("route.user", function, "get redis pool connection", err)
        })?;
        let removed = remove_user_sessions(&mut redis_conn, &user.id).map_err(|err| {
            AppError::internal("route.user", function, "remove user sessions", err)
        })?;
        tracing::info!(user_id = %user.id, removed, "user deactivated");
    }
    let detail = detail_user(&mut tx, &user, function).await?;
    tx.commit()
        .await
        .map_err(|err| AppError::internal("route.user", function, "commit transaction", err))?;
    Ok(detail)
}

#[OpenApi]
impl ApiUser {
    #[oai(path = "/admin/users", method = "get", tag = "ApiUserTags::User")]
    async fn get_paginate_user_api(
        &self,
        Query(page): Query<Option<u32>>,
        Query(page_size): Query<Option<u32>>,
        Query(search): Query<Option<String>>,
        Query(role): Query<Option<UserRole>>,
        Query(is_active): Query<Option<bool>>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Vec<DetailUser>>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.user", "get_paginate_user_api").await?;
        require_hr_admin(&request_user)?;
        let (page, page_size) = page_params(page, page_size);
        let filters = UserFilters {
            search,
            role,
            is_active,
        };
        let (data, counts, _) = get_all_user(&mut tx, page, page_size, &filters)
            .await
            .map_err(|err| {
                AppError::internal("route.user", "get_paginate_user_api", "get all user", err)
            })?;
        let results = data
            .iter()
            .map(|x| DetailUser::new(x, None, None))
            .collect();
        Ok(Json(DataResponse::paginated(
            results,
            page_meta(counts, page, page_size),
        )))
    }

    #[oai(path = "/admin/users/:id", method = "get", tag = "ApiUserTags::User")]
    async fn get_detail_user_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailUser>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.user", "get_detail_user_api").await?;
        require_hr_admin(&request_user)?;
        let user = find_user(&mut tx, &id, "get_detail_user_api").await?;
        let detail = detail_user(&mut tx, &user, "get_detail_user_api").await?;
        Ok(Json(DataResponse::new(detail)))
    }

    #[oai(path = "/admin/users", method = "post", tag = "ApiUserTags::User")]
    async fn create_user_api(
        &self,
        json: Json<UserCreateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<UserCreateResponses, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.user", "create_user_api").await?;
        require_hr_admin(&request_user)?;

        let email = json.email.trim().to_lowercase();
        let existing = get_user_by_email(&mut tx, &email).await.map_err(|err| {
            AppError::internal("route.user", "create_user_api", "get user by email", err)
        })?;
        if existing.is_some() {
            return Err(AppError::Conflict("User with this email already exists".to_string()).into());
        }
        let password = hash_password(&json.password).map_err(|err| {
            AppError::internal(
                "route.user",
                "create_user_api",
                "hash password",
                anyhow::anyhow!("{}", err),
            )
        })?;
        let now = Local::now().fixed_offset();
        let user = User {
            id: Uuid::now_v7(),
            email,
            password,
            full_name: json.full_name.clone(),
            role: json.role,
            is_active: json.is_active.unwrap_or(true),
            last_login_date: None,
            created_by: Some(request_user.id),
            updated_by: Some(request_user.id),
            created_date: Some(now),
            updated_date: Some(now),
        };
        create_user(&mut tx, &user).await.map_err(|err| {
            AppError::from_write(
                "route.user",
                "create_user_api",
                "create user",
                err,
                "User with this email already exists",
            )
        })?;
        let detail = DetailUser::new(&user, Some(&request_user), Some(&request_user));
        tx.commit().await.map_err(|err| {
            AppError::internal("route.user", "create_user_api", "commit transaction", err)
        })?;
        Ok(UserCreateResponses::Created(Json(DataResponse::new(detail))))
    }

    #[oai(path = "/admin/users/:id", method = "put", tag = "ApiUserTags::User")]
    async fn update_user_api(
        &self,
        Path(id): Path<String>,
        json: Json<UserUpdateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailUser>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.user", "update_user_api").await?;
        require_hr_admin(&request_user)?;
        let mut user = find_user(&mut tx, &id, "update_user_api").await?;

        if let Some(email) = &json.email {
            let email = email.trim().to_lowercase();
            let existing = get_user_by_email(&mut tx, &email).await.map_err(|err| {
                AppError::internal("route.user", "update_user_api", "get user by email", err)
            })?;
            if existing.is_some_and(|x| x.id != user.id) {
                return Err(
                    AppError::Conflict("User with this email already exists".to_string()).into(),
                );
            }
            user.email = email;
        }
        if let Some(password) = &json.password {
            user.password = hash_password(password).map_err(|err| {
                AppError::internal(
                    "route.user",
                    "update_user_api",
                    "hash password",
                    anyhow::anyhow!("{}", err),
                )
            })?;
        }
        if let Some(full_name) = &json.full_name {
            user.full_name = Some(full_name.clone());
        }
        if let Some(role) = json.role {
            if user.id == request_user.id && !role.is_hr_admin() {
                return Err(AppError::validation("You cannot remove your own HR Admin role").into());
            }
            user.role = role;
        }

        let now = Local::now().fixed_offset();
        update_user(&mut tx, &mut user, &request_user, &now)
            .await
            .map_err(|err| {
                AppError::from_write(
                    "route.user",
                    "update_user_api",
                    "update user",
                    err,
                    "User with this email already exists",
                )
            })?;
        let detail = detail_user(&mut tx, &user, "update_user_api").await?;
        tx.commit().await.map_err(|err| {
            AppError::internal("route.user", "update_user_api", "commit transaction", err)
        })?;
        Ok(Json(DataResponse::new(detail)))
    }

    #[oai(
        path = "/admin/users/:id/deactivate",
        method = "post",
        tag = "ApiUserTags::User"
    )]
    async fn deactivate_user_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailUser>>, ApiError> {
        let detail = set_active(&state, &auth, &id, false, "deactivate_user_api").await?;
        Ok(Json(DataResponse::new(detail)))
    }

    #[oai(
        path = "/admin/users/:id/activate",
        method = "post",
        tag = "ApiUserTags::User"
    )]
    async fn activate_user_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailUser>>, ApiError> {
        let detail = set_active(&state, &auth, &id, true, "activate_user_api").await?;
        Ok(Json(DataResponse::new(detail)))
    }
}
