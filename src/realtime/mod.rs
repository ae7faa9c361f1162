//! Employee change feed and per-client view subscriptions.

use serde::Deserialize;

use crate::model::employee::Employee;

pub mod listener;
pub mod subscription;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One row change as emitted by the `employee_changes` trigger.
#[derive(Clone, Debug, Deserialize)]
pub struct EmployeeChange {
    pub op: ChangeOp,
    pub old: Option<Employee>,
    pub new: Option<Employee>,
}
