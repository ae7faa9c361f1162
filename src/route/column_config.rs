use std::sync::Arc;

use chrono::Local;
use poem::web::Data;
use poem_openapi::{param::Path, payload::Json, OpenApi, Tags};
use sqlx::{types::Json as SqlxJson, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::{
        error::AppError,
        permission::{default_custom_permissions, visible_columns},
        security::{authenticate, require_hr_admin, BearerAuthorization},
        utils::parse_id,
    },
    model::{
        column_config::{ColumnConfig, ColumnDataType, RolePermissions},
        employee::Employee,
        role::UserRole,
        user::User,
    },
    repository::column_config::{
        create_column_config, delete_column_config, get_all_column_config,
        get_column_config_by_id, get_column_config_by_name, next_display_order,
        reorder_column_config, update_column_config,
    },
    schema::{
        column_config::{
            machine_name, parse_permissions, ColumnCreateRequest, ColumnCreateResponses,
            ColumnPermissionsRequest, ColumnReorderRequest, ColumnReorderResponse,
            ColumnUpdateRequest, DetailColumnConfig, VisibleColumn,
        },
        common::{ApiError, DataResponse, NoContentResponses},
    },
    AppState,
};

#[derive(Tags)]
enum ApiColumnConfigTags {
    Column,
    AdminColumn,
}

pub struct ApiColumnConfig;

async fn find_column(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    function: &'static str,
) -> Result<ColumnConfig, AppError> {
    let id = parse_id(id, "Column")?;
    get_column_config_by_id(tx, &id)
        .await
        .map_err(|err| {
            AppError::internal("route.column_config", function, "get column config by id", err)
        })?
        .ok_or(AppError::NotFound("Column".to_string()))
}

/// Select columns need at least one choice; other types carry none.
fn clean_options(
    data_type: ColumnDataType,
    options: Option<Vec<String>>,
) -> Result<Option<SqlxJson<Vec<String>>>, AppError> {
    if data_type != ColumnDataType::Select {
        return Ok(None);
    }
    let options: Vec<String> = options
        .unwrap_or_default()
        .into_iter()
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect();
    if options.is_empty() {
        return Err(AppError::validation("Select columns need at least one option"));
    }
    Ok(Some(SqlxJson(options)))
}

/// Insert a custom column owned by `owner`.
async fn insert_custom_column(
    tx: &mut Transaction<'_, Postgres>,
    json: &ColumnCreateRequest,
    owner: UserRole,
    permissions: RolePermissions,
    request_user: &User,
    function: &'static str,
) -> Result<ColumnConfig, AppError> {
    let column_name = machine_name(&json.column_name)?;
    let duplicate = format!("A column named {} already exists", column_name);
    if Employee::is_reserved_name(&column_name) {
        return Err(AppError::Conflict(duplicate));
    }
    let existing = get_column_config_by_name(tx, &column_name, owner)
        .await
        .map_err(|err| {
            AppError::internal("route.column_config", function, "get column config by name", err)
        })?;
    if existing.is_some() {
        return Err(AppError::Conflict(duplicate));
    }
    let display_order = next_display_order(tx).await.map_err(|err| {
        AppError::internal("route.column_config", function, "next display order", err)
    })?;
    let now = Local::now().fixed_offset();
    let column = ColumnConfig {
        id: Uuid::now_v7(),
        column_name,
        display_name: json.display_name.trim().to_string(),
        data_type: json.data_type,
        is_masterdata: false,
        category: json.category.clone(),
        display_order,
        is_visible: json.is_visible.unwrap_or(true),
        owner_role: Some(owner.to_string()),
        options: clean_options(json.data_type, json.options.clone())?,
        role_permissions: SqlxJson(permissions),
        created_by: Some(request_user.id),
        updated_by: Some(request_user.id),
        created_date: Some(now),
        updated_date: Some(now),
    };
    create_column_config(tx, &column).await.map_err(|err| {
        AppError::from_write(
            "route.column_config",
            function,
            "create column config",
            err,
            duplicate,
        )
    })?;
    Ok(column)
}

async fn remove_column(
    tx: &mut Transaction<'_, Postgres>,
    column: &ColumnConfig,
    function: &'static str,
) -> Result<(), AppError> {
    if column.is_masterdata {
        return Err(AppError::validation("Masterdata columns cannot be deleted"));
    }
    let deleted = delete_column_config(tx, column).await.map_err(|err| {
        AppError::internal("route.column_config", function, "delete column config", err)
    })?;
    if !deleted {
        return Err(AppError::NotFound("Column".to_string()));
    }
    tracing::info!(column = %column.column_name, "custom column deleted");
    Ok(())
}

#[OpenApi]
impl ApiColumnConfig {
    #[oai(path = "/columns", method = "get", tag = "ApiColumnConfigTags::Column")]
    async fn get_visible_column_api(
        &self,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Vec<VisibleColumn>>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "get_visible_column_api").await?;
        let columns = get_all_column_config(&mut tx).await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "get_visible_column_api",
                "get all column config",
                err,
            )
        })?;
        let data = visible_columns(request_user.role, &columns)
            .iter()
            .map(|x| VisibleColumn::new(x, request_user.role))
            .collect();
        Ok(Json(DataResponse::new(data)))
    }

    /// Add a custom column owned by the caller's role.
    #[oai(path = "/columns", method = "post", tag = "ApiColumnConfigTags::Column")]
    async fn create_owned_column_api(
        &self,
        json: Json<ColumnCreateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<ColumnCreateResponses, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "create_owned_column_api").await?;
        let owner = request_user.role;
        let column = insert_custom_column(
            &mut tx,
            &json,
            owner,
            default_custom_permissions(owner),
            &request_user,
            "create_owned_column_api",
        )
        .await?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "create_owned_column_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(ColumnCreateResponses::Created(Json(DataResponse::new(
            DetailColumnConfig::from(&column),
        ))))
    }

    #[oai(path = "/columns/:id", method = "delete", tag = "ApiColumnConfigTags::Column")]
    async fn delete_owned_column_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<NoContentResponses, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "delete_owned_column_api").await?;
        let column = find_column(&mut tx, &id, "delete_owned_column_api").await?;
        if column.is_masterdata {
            return Err(AppError::validation("Masterdata columns cannot be deleted").into());
        }
        if column.owner() != Some(request_user.role) {
            return Err(AppError::Forbidden("You can only delete your own columns".to_string()).into());
        }
        remove_column(&mut tx, &column, "delete_owned_column_api").await?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "delete_owned_column_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(NoContentResponses::NoContent)
    }

    #[oai(
        path = "/admin/columns",
        method = "get",
        tag = "ApiColumnConfigTags::AdminColumn"
    )]
    async fn get_all_column_api(
        &self,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Vec<DetailColumnConfig>>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "get_all_column_api").await?;
        require_hr_admin(&request_user)?;
        let columns = get_all_column_config(&mut tx).await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "get_all_column_api",
                "get all column config",
                err,
            )
        })?;
        Ok(Json(DataResponse::new(
            columns.iter().map(DetailColumnConfig::from).collect(),
        )))
    }

    #[oai(
        path = "/admin/columns",
        method = "post",
        tag = "ApiColumnConfigTags::AdminColumn"
    )]
    async fn create_column_api(
        &self,
        json: Json<ColumnCreateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<ColumnCreateResponses, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "create_column_api").await?;
        require_hr_admin(&request_user)?;
        let permissions = match &json.role_permissions {
            Some(raw) => parse_permissions(raw, false)?,
            None => default_custom_permissions(UserRole::HrAdmin),
        };
        let column = insert_custom_column(
            &mut tx,
            &json,
            UserRole::HrAdmin,
            permissions,
            &request_user,
            "create_column_api",
        )
        .await?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "create_column_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(ColumnCreateResponses::Created(Json(DataResponse::new(
            DetailColumnConfig::from(&column),
        ))))
    }

    #[oai(
        path = "/admin/columns/reorder",
        method = "put",
        tag = "ApiColumnConfigTags::AdminColumn"
    )]
    async fn reorder_column_api(
        &self,
        json: Json<ColumnReorderRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<ColumnReorderResponse>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "reorder_column_api").await?;
        require_hr_admin(&request_user)?;
        let orders = json
            .items
            .iter()
            .map(|x| Ok((parse_id(&x.id, "Column")?, x.display_order)))
            .collect::<Result<Vec<(Uuid, i32)>, AppError>>()?;
        let now = Local::now().fixed_offset();
        let updated = reorder_column_config(&mut tx, &orders, &request_user, &now)
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.column_config",
                    "reorder_column_api",
                    "reorder column config",
                    err,
                )
            })?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "reorder_column_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(Json(DataResponse::new(ColumnReorderResponse { updated })))
    }

    #[oai(
        path = "/admin/columns/:id",
        method = "put",
        tag = "ApiColumnConfigTags::AdminColumn"
    )]
    async fn update_column_api(
        &self,
        Path(id): Path<String>,
        json: Json<ColumnUpdateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailColumnConfig>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "update_column_api").await?;
        require_hr_admin(&request_user)?;
        let mut column = find_column(&mut tx, &id, "update_column_api").await?;

        if column.is_masterdata {
            if json.is_visible == Some(false) {
                return Err(AppError::validation("Masterdata columns cannot be hidden").into());
            }
            if json.data_type.is_some_and(|x| x != column.data_type) {
                return Err(
                    AppError::validation("Masterdata columns cannot change type").into(),
                );
            }
        }
        if let Some(display_name) = &json.display_name {
            column.display_name = display_name.trim().to_string();
        }
        if let Some(data_type) = json.data_type {
            column.data_type = data_type;
        }
        if json.category.is_some() {
            column.category = json.category.clone();
        }
        if let Some(display_order) = json.display_order {
            column.display_order = display_order;
        }
        if let Some(is_visible) = json.is_visible {
            column.is_visible = is_visible;
        }
        if !column.is_masterdata {
            let options = json
                .options
                .clone()
                .or_else(|| column.options.as_ref().map(|x| x.0.clone()));
            column.options = clean_options(column.data_type, options)?;
        }

        let now = Local::now().fixed_offset();
        update_column_config(&mut tx, &mut column, &request_user, &now)
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.column_config",
                    "update_column_api",
                    "update column config",
                    err,
                )
            })?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "update_column_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(Json(DataResponse::new(DetailColumnConfig::from(&column))))
    }

    /// Replace a column's permission matrix. Edit implies view, and masterdata
    /// always keeps full HR Admin access.
    #[oai(
        path = "/admin/columns/:id/permissions",
        method = "put",
        tag = "ApiColumnConfigTags::AdminColumn"
    )]
    async fn update_column_permissions_api(
        &self,
        Path(id): Path<String>,
        json: Json<ColumnPermissionsRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailColumnConfig>>, ApiError> {
        let (mut tx, request_user) = authenticate(
            &state,
            &auth,
            "route.column_config",
            "update_column_permissions_api",
        )
        .await?;
        require_hr_admin(&request_user)?;
        let mut column = find_column(&mut tx, &id, "update_column_permissions_api").await?;
        column.role_permissions =
            SqlxJson(parse_permissions(&json.role_permissions, column.is_masterdata)?);

        let now = Local::now().fixed_offset();
        update_column_config(&mut tx, &mut column, &request_user, &now)
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.column_config",
                    "update_column_permissions_api",
                    "update column config",
                    err,
                )
            })?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "update_column_permissions_api",
                "commit transaction",
                err,
            )
        })?;
        tracing::info!(column = %column.column_name, "column permissions updated");
        Ok(Json(DataResponse::new(DetailColumnConfig::from(&column))))
    }

    #[oai(
        path = "/admin/columns/:id",
        method = "delete",
        tag = "ApiColumnConfigTags::AdminColumn"
    )]
    async fn delete_column_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<NoContentResponses, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.column_config", "delete_column_api").await?;
        require_hr_admin(&request_user)?;
        let column = find_column(&mut tx, &id, "delete_column_api").await?;
        remove_column(&mut tx, &column, "delete_column_api").await?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.column_config",
                "delete_column_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(NoContentResponses::NoContent)
    }
}
