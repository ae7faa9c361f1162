use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{prelude::FromRow, types::Json};
use uuid::Uuid;

use super::role::UserRole;

pub const TABLE_NAME: &str = "public.column_config";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ColumnDataType {
    Text,
    Number,
    Date,
    Boolean,
    Select,
}

impl ColumnDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnDataType::Text => "text",
            ColumnDataType::Number => "number",
            ColumnDataType::Date => "date",
            ColumnDataType::Boolean => "boolean",
            ColumnDataType::Select => "select",
        }
    }

    /// Coerce an incoming cell value (JSON or CSV text) into the stored JSON shape.
    pub fn coerce(&self, value: &Value, options: Option<&[String]>) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Value::String(s) = value {
            if s.trim().is_empty() {
                return Ok(Value::Null);
            }
        }
        match self {
            ColumnDataType::Text => match value {
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err("expected text".to_string()),
            },
            ColumnDataType::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => s
                    .trim()
                    .replace(',', ".")
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or(format!("'{}' is not a number", s)),
                _ => Err("expected a number".to_string()),
            },
            ColumnDataType::Date => match value {
                Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .map_err(|_| format!("'{}' is not a date (YYYY-MM-DD)", s)),
                _ => Err("expected a date (YYYY-MM-DD)".to_string()),
            },
            ColumnDataType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "yes" | "ja" | "1" | "x" => Ok(Value::Bool(true)),
                    "false" | "no" | "nej" | "0" => Ok(Value::Bool(false)),
                    _ => Err(format!("'{}' is not a boolean", s)),
                },
                Value::Number(n) => match n.as_i64() {
                    Some(1) => Ok(Value::Bool(true)),
                    Some(0) => Ok(Value::Bool(false)),
                    _ => Err(format!("'{}' is not a boolean", n)),
                },
                _ => Err("expected a boolean".to_string()),
            },
            ColumnDataType::Select => {
                let choice = match value {
                    Value::String(s) => s.trim().to_string(),
                    _ => return Err("expected one of the column options".to_string()),
                };
                match options {
                    Some(opts) if !opts.iter().any(|o| o == &choice) => Err(format!(
                        "'{}' is not one of: {}",
                        choice,
                        opts.join(", ")
                    )),
                    _ => Ok(Value::String(choice)),
                }
            }
        }
    }
}

impl TryFrom<String> for ColumnDataType {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "text" => Ok(ColumnDataType::Text),
            "number" => Ok(ColumnDataType::Number),
            "date" => Ok(ColumnDataType::Date),
            "boolean" => Ok(ColumnDataType::Boolean),
            "select" => Ok(ColumnDataType::Select),
            other => Err(anyhow::anyhow!("unknown column data type: {}", other)),
        }
    }
}

#[derive(Object, Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColumnPermission {
    pub view: bool,
    pub edit: bool,
}

pub type RolePermissions = BTreeMap<UserRole, ColumnPermission>;

#[derive(Clone, Debug, FromRow)]
pub struct ColumnConfig {
    pub id: Uuid,
    pub column_name: String,
    pub display_name: String,
    #[sqlx(try_from = "String")]
    pub data_type: ColumnDataType,
    pub is_masterdata: bool,
    pub category: Option<String>,
    pub display_order: i32,
    pub is_visible: bool,
    pub owner_role: Option<String>,
    pub options: Option<Json<Vec<String>>>,
    pub role_permissions: Json<RolePermissions>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_date: Option<DateTime<FixedOffset>>,
    pub updated_date: Option<DateTime<FixedOffset>>,
}

impl ColumnConfig {
    pub fn owner(&self) -> Option<UserRole> {
        self.owner_role.as_deref().and_then(|x| x.parse().ok())
    }

    /// Role scope used for name uniqueness.
    pub fn scope(&self) -> UserRole {
        self.owner().unwrap_or(UserRole::HrAdmin)
    }

    pub fn option_list(&self) -> Option<&[String]> {
        self.options.as_ref().map(|x| x.0.as_slice())
    }

    /// Key of this column's values in `employee.custom_fields`. Custom
    /// columns in different scopes may share a name, so values live under
    /// the column id.
    pub fn storage_key(&self) -> String {
        self.id.to_string()
    }
}
