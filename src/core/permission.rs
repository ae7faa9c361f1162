//! Column permission evaluation.
//!
//! Each column carries a `role -> {view, edit}` matrix. A role missing from
//! the matrix gets neither. HR Admin always sees and edits masterdata.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{
    core::error::AppError,
    model::{
        column_config::{ColumnConfig, ColumnPermission, RolePermissions},
        employee::Employee,
        role::UserRole,
    },
};

pub fn permission_for(role: UserRole, column: &ColumnConfig) -> ColumnPermission {
    if column.is_masterdata && role.is_hr_admin() {
        return ColumnPermission {
            view: true,
            edit: true,
        };
    }
    let stored = column
        .role_permissions
        .0
        .get(&role)
        .copied()
        .unwrap_or_default();
    // edit without view is never granted
    ColumnPermission {
        view: stored.view || stored.edit,
        edit: stored.edit,
    }
}

pub fn can_view(role: UserRole, column: &ColumnConfig) -> bool {
    permission_for(role, column).view
}

pub fn can_edit(role: UserRole, column: &ColumnConfig) -> bool {
    permission_for(role, column).edit
}

/// Normalise a permission matrix before it is persisted.
pub fn normalize_permissions(mut permissions: RolePermissions, is_masterdata: bool) -> RolePermissions {
    for permission in permissions.values_mut() {
        if permission.edit {
            permission.view = true;
        }
    }
    if is_masterdata {
        permissions.insert(
            UserRole::HrAdmin,
            ColumnPermission {
                view: true,
                edit: true,
            },
        );
    }
    permissions
}

/// Default matrix for a custom column created by `owner`.
pub fn default_custom_permissions(owner: UserRole) -> RolePermissions {
    let mut permissions = RolePermissions::new();
    permissions.insert(
        owner,
        ColumnPermission {
            view: true,
            edit: true,
        },
    );
    permissions.insert(
        UserRole::HrAdmin,
        ColumnPermission {
            view: true,
            edit: true,
        },
    );
    permissions
}

/// Columns visible to `role`, ordered by display order.
pub fn visible_columns(role: UserRole, columns: &[ColumnConfig]) -> Vec<ColumnConfig> {
    let mut visible: Vec<ColumnConfig> = columns
        .iter()
        .filter(|x| x.is_visible && can_view(role, x))
        .cloned()
        .collect();
    visible.sort_by_key(|x| x.display_order);
    visible
}

/// Project an employee onto the columns `role` may view. `id` is always kept.
pub fn project_employee(employee: &Employee, role: UserRole, columns: &[ColumnConfig]) -> Value {
    let mut row = Map::new();
    row.insert("id".to_string(), Value::String(employee.id.to_string()));
    let mut custom = Map::new();
    for column in visible_columns(role, columns) {
        let value = employee.column_value(&column);
        if column.is_masterdata {
            row.insert(column.column_name.clone(), value);
        } else {
            custom.insert(column.column_name.clone(), value);
        }
    }
    if role.is_hr_admin() {
        row.insert(
            "archived_date".to_string(),
            employee
                .archived_date
                .map(|x| Value::String(x.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
    }
    row.insert("custom_fields".to_string(), Value::Object(custom));
    Value::Object(row)
}

/// Apply `changes` (column name -> value) as `role`. Every column is checked
/// for edit permission; invalid values are reported per column.
pub fn apply_cell_edits(
    employee: &mut Employee,
    changes: &BTreeMap<String, Value>,
    columns: &[ColumnConfig],
    role: UserRole,
) -> Result<(), AppError> {
    let mut errors = Map::new();
    for (name, value) in changes {
        let name = name.trim();
        let candidates: Vec<&ColumnConfig> = columns
            .iter()
            .filter(|x| x.column_name.eq_ignore_ascii_case(name))
            .collect();
        if candidates.is_empty() {
            errors.insert(name.to_string(), Value::String("unknown column".to_string()));
            continue;
        }
        // custom columns in different scopes may share a name
        let column = match candidates.into_iter().find(|x| can_edit(role, x)) {
            Some(val) => val,
            None => {
                return Err(AppError::Forbidden(format!(
                    "You cannot edit the column {}",
                    name
                )))
            }
        };
        if let Err(message) = employee.apply_cell(column, value) {
            errors.insert(column.column_name.clone(), Value::String(message));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation_with(
            "Invalid employee data",
            Value::Object(errors),
        ))
    }
}
