use std::collections::BTreeMap;

use poem_openapi::{payload::Json, ApiResponse, Object};
use serde::{Deserialize, Serialize};

use super::common::DataResponse;
use crate::{
    core::{
        error::AppError,
        permission::{normalize_permissions, permission_for},
    },
    model::{
        column_config::{ColumnConfig, ColumnDataType, ColumnPermission, RolePermissions},
        role::UserRole,
    },
};

#[derive(Object, Deserialize, Serialize, Debug, Clone)]
pub struct DetailColumnConfig {
    pub id: String,
    pub column_name: String,
    pub display_name: String,
    pub data_type: ColumnDataType,
    pub is_masterdata: bool,
    pub category: Option<String>,
    pub display_order: i32,
    pub is_visible: bool,
    pub owner_role: Option<String>,
    pub options: Option<Vec<String>>,
    pub role_permissions: BTreeMap<String, ColumnPermission>,
}

impl From<&ColumnConfig> for DetailColumnConfig {
    fn from(column: &ColumnConfig) -> Self {
        Self {
            id: column.id.to_string(),
            column_name: column.column_name.clone(),
            display_name: column.display_name.clone(),
            data_type: column.data_type,
            is_masterdata: column.is_masterdata,
            category: column.category.clone(),
            display_order: column.display_order,
            is_visible: column.is_visible,
            owner_role: column.owner_role.clone(),
            options: column.options.as_ref().map(|x| x.0.clone()),
            role_permissions: column
                .role_permissions
                .0
                .iter()
                .map(|(role, permission)| (role.to_string(), *permission))
                .collect(),
        }
    }
}

/// A column as seen by one role, with that role's effective permission.
#[derive(Object, Deserialize, Serialize, Debug, Clone)]
pub struct VisibleColumn {
    pub id: String,
    pub column_name: String,
    pub display_name: String,
    pub data_type: ColumnDataType,
    pub is_masterdata: bool,
    pub category: Option<String>,
    pub display_order: i32,
    pub options: Option<Vec<String>>,
    pub can_edit: bool,
    /// Set when the caller owns this custom column
    pub is_owner: bool,
}

impl VisibleColumn {
    pub fn new(column: &ColumnConfig, role: UserRole) -> Self {
        Self {
            id: column.id.to_string(),
            column_name: column.column_name.clone(),
            display_name: column.display_name.clone(),
            data_type: column.data_type,
            is_masterdata: column.is_masterdata,
            category: column.category.clone(),
            display_order: column.display_order,
            options: column.options.as_ref().map(|x| x.0.clone()),
            can_edit: permission_for(role, column).edit,
            is_owner: !column.is_masterdata && column.owner() == Some(role),
        }
    }
}

/// Parse and normalise a permission matrix keyed by role name.
pub fn parse_permissions(
    raw: &BTreeMap<String, ColumnPermission>,
    is_masterdata: bool,
) -> Result<RolePermissions, AppError> {
    let mut permissions = RolePermissions::new();
    for (role, permission) in raw {
        let role: UserRole = role
            .parse()
            .map_err(|_| AppError::validation(format!("Unknown role: {}", role)))?;
        permissions.insert(role, *permission);
    }
    Ok(normalize_permissions(permissions, is_masterdata))
}

#[derive(Object, Deserialize)]
pub struct ColumnCreateRequest {
    #[oai(validator(min_length = 1, max_length = 100))]
    pub column_name: String,
    #[oai(validator(min_length = 1, max_length = 255))]
    pub display_name: String,
    pub data_type: ColumnDataType,
    #[oai(validator(max_length = 100))]
    pub category: Option<String>,
    pub options: Option<Vec<String>>,
    pub is_visible: Option<bool>,
    /// HR Admin only; external parties get the default matrix
    pub role_permissions: Option<BTreeMap<String, ColumnPermission>>,
}

#[derive(Object, Deserialize)]
pub struct ColumnUpdateRequest {
    #[oai(validator(min_length = 1, max_length = 255))]
    pub display_name: Option<String>,
    pub data_type: Option<ColumnDataType>,
    #[oai(validator(max_length = 100))]
    pub category: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
    pub options: Option<Vec<String>>,
}

#[derive(Object, Deserialize)]
pub struct ColumnPermissionsRequest {
    pub role_permissions: BTreeMap<String, ColumnPermission>,
}

#[derive(Object, Deserialize)]
pub struct ColumnOrderItem {
    pub id: String,
    pub display_order: i32,
}

#[derive(Object, Deserialize)]
pub struct ColumnReorderRequest {
    #[oai(validator(min_items = 1))]
    pub items: Vec<ColumnOrderItem>,
}

#[derive(Object, Deserialize, Serialize)]
pub struct ColumnReorderResponse {
    pub updated: u64,
}

#[derive(ApiResponse)]
pub enum ColumnCreateResponses {
    #[oai(status = 201)]
    Created(Json<DataResponse<DetailColumnConfig>>),
}

/// Machine name for a new column: trimmed, lowercase, spaces folded to `_`.
pub fn machine_name(column_name: &str) -> Result<String, AppError> {
    let name = column_name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join("_");
    let valid = name
        .chars()
        .next()
        .map(|x| x.is_alphabetic())
        .unwrap_or(false)
        && name.chars().all(|x| x.is_alphanumeric() || x == '_');
    if !valid {
        return Err(AppError::validation(
            "Column name must start with a letter and contain only letters, digits and spaces",
        ));
    }
    Ok(name)
}
