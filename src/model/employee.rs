use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{prelude::FromRow, types::Json};
use uuid::Uuid;

use super::column_config::ColumnConfig;

pub const TABLE_NAME: &str = "public.employee";

/// Masterdata columns, in the order they are exported.
pub const MASTERDATA_COLUMNS: [&str; 16] = [
    "first_name",
    "last_name",
    "ssn",
    "email",
    "mobile",
    "rank",
    "gender",
    "town_district",
    "stena_date",
    "omc_date",
    "pe3_date",
    "comments",
    "is_terminated",
    "termination_date",
    "termination_reason",
    "is_archived",
];

/// Only changed through the archive / terminate actions.
pub const LIFECYCLE_COLUMNS: [&str; 4] = [
    "is_terminated",
    "termination_date",
    "termination_reason",
    "is_archived",
];

/// Row keys of a projected employee that are not columns.
pub const RESERVED_KEYS: [&str; 3] = ["id", "custom_fields", "archived_date"];

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub ssn: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub rank: Option<String>,
    pub gender: Option<String>,
    pub town_district: Option<String>,
    pub stena_date: Option<Uuid>,
    pub omc_date: Option<Uuid>,
    pub pe3_date: Option<Uuid>,
    pub comments: Option<String>,
    pub is_terminated: bool,
    pub termination_date: Option<NaiveDate>,
    pub termination_reason: Option<String>,
    pub is_archived: bool,
    pub archived_date: Option<DateTime<FixedOffset>>,
    pub custom_fields: Json<Map<String, Value>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_date: Option<DateTime<FixedOffset>>,
    pub updated_date: Option<DateTime<FixedOffset>>,
}

fn opt_text(value: &Value, column: &str) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(format!("{} must be text", column)),
    }
}

fn required_text(value: &Value, column: &str) -> Result<String, String> {
    opt_text(value, column)?.ok_or(format!("{} is required", column))
}

fn opt_uuid(value: &Value, column: &str) -> Result<Option<Uuid>, String> {
    match opt_text(value, column)? {
        None => Ok(None),
        Some(s) => Uuid::parse_str(&s)
            .map(Some)
            .map_err(|_| format!("{} must reference an important date id", column)),
    }
}

impl Employee {
    /// Fresh, active employee with no optional data set.
    pub fn new(created_by: Option<Uuid>, now: DateTime<FixedOffset>) -> Self {
        Self {
            id: Uuid::now_v7(),
            first_name: String::new(),
            last_name: String::new(),
            ssn: String::new(),
            email: None,
            mobile: None,
            rank: None,
            gender: None,
            town_district: None,
            stena_date: None,
            omc_date: None,
            pe3_date: None,
            comments: None,
            is_terminated: false,
            termination_date: None,
            termination_reason: None,
            is_archived: false,
            archived_date: None,
            custom_fields: Json(Map::new()),
            created_by,
            updated_by: created_by,
            created_date: Some(now),
            updated_date: Some(now),
        }
    }

    /// Names of the required masterdata fields that are still blank.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("ssn", &self.ssn),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_masterdata_column(column: &str) -> bool {
        MASTERDATA_COLUMNS.contains(&column)
    }

    pub fn is_lifecycle_column(column: &str) -> bool {
        LIFECYCLE_COLUMNS.contains(&column)
    }

    /// Names a custom column may not take.
    pub fn is_reserved_name(column: &str) -> bool {
        Self::is_masterdata_column(column) || RESERVED_KEYS.contains(&column)
    }

    /// Current value of a masterdata field as JSON. Anything else is null;
    /// custom values are read through [`Employee::column_value`].
    pub fn field_value(&self, column: &str) -> Value {
        let to_value = |x: &Option<String>| x.clone().map(Value::String).unwrap_or(Value::Null);
        let uuid_value = |x: &Option<Uuid>| x.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null);
        match column {
            "first_name" => Value::String(self.first_name.clone()),
            "last_name" => Value::String(self.last_name.clone()),
            "ssn" => Value::String(self.ssn.clone()),
            "email" => to_value(&self.email),
            "mobile" => to_value(&self.mobile),
            "rank" => to_value(&self.rank),
            "gender" => to_value(&self.gender),
            "town_district" => to_value(&self.town_district),
            "stena_date" => uuid_value(&self.stena_date),
            "omc_date" => uuid_value(&self.omc_date),
            "pe3_date" => uuid_value(&self.pe3_date),
            "comments" => to_value(&self.comments),
            "is_terminated" => Value::Bool(self.is_terminated),
            "termination_date" => self
                .termination_date
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            "termination_reason" => to_value(&self.termination_reason),
            "is_archived" => Value::Bool(self.is_archived),
            _ => Value::Null,
        }
    }

    /// Current value of `column`, masterdata or custom.
    pub fn column_value(&self, column: &ColumnConfig) -> Value {
        if column.is_masterdata {
            return self.field_value(&column.column_name);
        }
        self.custom_fields
            .0
            .get(&column.storage_key())
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Apply one inline cell edit. Lifecycle columns are rejected.
    pub fn apply_cell(&mut self, column: &ColumnConfig, value: &Value) -> Result<(), String> {
        let name = column.column_name.as_str();
        if Self::is_lifecycle_column(name) {
            return Err(format!(
                "{} can only be changed through the archive or terminate actions",
                name
            ));
        }
        if !column.is_masterdata {
            let coerced = column.data_type.coerce(value, column.option_list())?;
            if coerced.is_null() {
                self.custom_fields.0.remove(&column.storage_key());
            } else {
                self.custom_fields.0.insert(column.storage_key(), coerced);
            }
            return Ok(());
        }
        match name {
            "first_name" => self.first_name = required_text(value, name)?,
            "last_name" => self.last_name = required_text(value, name)?,
            "ssn" => self.ssn = required_text(value, name)?,
            "email" => self.email = opt_text(value, name)?,
            "mobile" => self.mobile = opt_text(value, name)?,
            "rank" => self.rank = opt_text(value, name)?,
            "gender" => self.gender = opt_text(value, name)?,
            "town_district" => self.town_district = opt_text(value, name)?,
            "stena_date" => self.stena_date = opt_uuid(value, name)?,
            "omc_date" => self.omc_date = opt_uuid(value, name)?,
            "pe3_date" => self.pe3_date = opt_uuid(value, name)?,
            "comments" => self.comments = opt_text(value, name)?,
            other => return Err(format!("unknown column {}", other)),
        }
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<FixedOffset>) {
        self.is_archived = true;
        self.archived_date = Some(now);
    }

    pub fn unarchive(&mut self) {
        self.is_archived = false;
        self.archived_date = None;
    }

    pub fn terminate(&mut self, date: NaiveDate, reason: Option<String>) {
        self.is_terminated = true;
        self.termination_date = Some(date);
        self.termination_reason = reason;
    }

    pub fn reactivate(&mut self) {
        self.is_terminated = false;
        self.termination_date = None;
        self.termination_reason = None;
    }

    pub fn important_date_refs(&self) -> Vec<Uuid> {
        [self.stena_date, self.omc_date, self.pe3_date]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
pub mod tests {
    use chrono::{Local, NaiveDate};
    use serde_json::{json, Map};
    use sqlx::types::Json;
    use uuid::Uuid;

    use super::Employee;
    use crate::model::column_config::{ColumnConfig, ColumnDataType};

    pub fn sample_employee() -> Employee {
        Employee {
            id: Uuid::now_v7(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            ssn: "19900101-1234".to_string(),
            email: Some("jane@example.com".to_string()),
            mobile: None,
            rank: None,
            gender: None,
            town_district: None,
            stena_date: None,
            omc_date: None,
            pe3_date: None,
            comments: None,
            is_terminated: false,
            termination_date: None,
            termination_reason: None,
            is_archived: false,
            archived_date: None,
            custom_fields: Json(Map::new()),
            created_by: None,
            updated_by: None,
            created_date: None,
            updated_date: None,
        }
    }

    fn column(name: &str, masterdata: bool, data_type: ColumnDataType) -> ColumnConfig {
        ColumnConfig {
            id: Uuid::now_v7(),
            column_name: name.to_string(),
            display_name: name.to_string(),
            data_type,
            is_masterdata: masterdata,
            category: None,
            display_order: 0,
            is_visible: true,
            owner_role: None,
            options: None,
            role_permissions: Json(Default::default()),
            created_by: None,
            updated_by: None,
            created_date: None,
            updated_date: None,
        }
    }

    #[test]
    fn test_archive_round_trip() {
        let mut employee = sample_employee();
        employee.archive(Local::now().fixed_offset());
        assert!(employee.is_archived);
        assert!(employee.archived_date.is_some());
        employee.unarchive();
        assert!(!employee.is_archived);
        assert!(employee.archived_date.is_none());
    }

    #[test]
    fn test_terminate_round_trip() {
        let mut employee = sample_employee();
        let date = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        employee.terminate(date, Some("contract ended".to_string()));
        assert!(employee.is_terminated);
        assert_eq!(employee.termination_date, Some(date));
        assert_eq!(employee.field_value("termination_date"), json!("2025-03-31"));
        employee.reactivate();
        assert!(!employee.is_terminated);
        assert!(employee.termination_date.is_none());
        assert!(employee.termination_reason.is_none());
    }

    #[test]
    fn test_apply_masterdata_cell() {
        let mut employee = sample_employee();
        let col = column("mobile", true, ColumnDataType::Text);
        employee.apply_cell(&col, &json!(" 070-123 ")).unwrap();
        assert_eq!(employee.mobile.as_deref(), Some("070-123"));
        employee.apply_cell(&col, &json!("")).unwrap();
        assert!(employee.mobile.is_none());

        let col = column("first_name", true, ColumnDataType::Text);
        assert!(employee.apply_cell(&col, &json!(null)).is_err());
    }

    #[test]
    fn test_lifecycle_cell_is_rejected() {
        let mut employee = sample_employee();
        let col = column("is_archived", true, ColumnDataType::Boolean);
        assert!(employee.apply_cell(&col, &json!(true)).is_err());
        assert!(!employee.is_archived);
    }

    #[test]
    fn test_apply_custom_cell() {
        let mut employee = sample_employee();
        let col = column("shoe_size", false, ColumnDataType::Number);
        employee.apply_cell(&col, &json!("42")).unwrap();
        assert_eq!(employee.column_value(&col), json!(42.0));
        assert_eq!(employee.custom_fields.0.get(&col.id.to_string()), Some(&json!(42.0)));
        assert!(employee.apply_cell(&col, &json!("large")).is_err());
        employee.apply_cell(&col, &json!(null)).unwrap();
        assert_eq!(employee.column_value(&col), json!(null));
        assert!(employee.custom_fields.0.is_empty());
    }

    #[test]
    fn test_custom_column_never_reads_masterdata() {
        let mut employee = sample_employee();
        let custom = column("ssn", false, ColumnDataType::Text);
        assert_eq!(employee.column_value(&custom), json!(null));

        employee.apply_cell(&custom, &json!("locker 4")).unwrap();
        assert_eq!(employee.ssn, "19900101-1234");
        assert_eq!(employee.column_value(&custom), json!("locker 4"));
        let masterdata = column("ssn", true, ColumnDataType::Text);
        assert_eq!(employee.column_value(&masterdata), json!("19900101-1234"));
    }

    #[test]
    fn test_same_name_custom_columns_do_not_share_values() {
        let mut employee = sample_employee();
        let first = column("locker", false, ColumnDataType::Text);
        let second = column("locker", false, ColumnDataType::Text);
        employee.apply_cell(&first, &json!("A1")).unwrap();
        assert_eq!(employee.column_value(&first), json!("A1"));
        assert_eq!(employee.column_value(&second), json!(null));
    }

    #[test]
    fn test_reserved_names() {
        for name in ["ssn", "first_name", "is_archived", "id", "custom_fields", "archived_date"] {
            assert!(Employee::is_reserved_name(name), "{}", name);
        }
        assert!(!Employee::is_reserved_name("locker"));
    }

    #[test]
    fn test_date_reference_must_be_uuid() {
        let mut employee = sample_employee();
        let col = column("stena_date", true, ColumnDataType::Date);
        assert!(employee.apply_cell(&col, &json!("next week")).is_err());
        let id = Uuid::now_v7();
        employee.apply_cell(&col, &json!(id.to_string())).unwrap();
        assert_eq!(employee.important_date_refs(), vec![id]);
    }

    #[test]
    fn test_new_employee_requires_names_and_ssn() {
        let mut employee = Employee::new(None, Local::now().fixed_offset());
        assert_eq!(employee.missing_required(), vec!["first_name", "last_name", "ssn"]);
        employee.first_name = "Jane".to_string();
        employee.last_name = "Doe".to_string();
        employee.ssn = " ".to_string();
        assert_eq!(employee.missing_required(), vec!["ssn"]);
        assert!(!employee.is_archived && !employee.is_terminated);
    }
}
