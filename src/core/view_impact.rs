//! Reconciles employee change events against a subscriber's current view.
//!
//! A change is classified as added, removed or updated relative to the set of
//! employee ids the subscriber currently sees, and impacts are collected into
//! batches that render either one message per employee or a count summary.

use std::collections::HashSet;

use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    core::permission::{can_view, visible_columns},
    model::{column_config::ColumnConfig, employee::Employee, role::UserRole},
};

/// Changes outside of these fields never produce an "updated" notification.
pub const TRACKED_FIELDS: [&str; 12] = [
    "first_name",
    "last_name",
    "email",
    "mobile",
    "ssn",
    "is_archived",
    "is_terminated",
    "termination_date",
    "termination_reason",
    "stena_date",
    "omc_date",
    "pe3_date",
];

/// Masterdata columns a free-text search may look at.
pub const SEARCH_COLUMNS: [&str; 4] = ["first_name", "last_name", "ssn", "email"];

fn default_search_columns() -> Vec<String> {
    SEARCH_COLUMNS.iter().map(|x| x.to_string()).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmployeeFilters {
    pub search: Option<String>,
    pub include_archived: bool,
    pub include_terminated: bool,
    #[serde(default = "default_search_columns")]
    pub search_columns: Vec<String>,
}

impl Default for EmployeeFilters {
    fn default() -> Self {
        Self {
            search: None,
            include_archived: false,
            include_terminated: false,
            search_columns: default_search_columns(),
        }
    }
}

impl EmployeeFilters {
    pub fn new(search: Option<String>, include_archived: bool, include_terminated: bool) -> Self {
        Self {
            search,
            include_archived,
            include_terminated,
            ..Default::default()
        }
    }

    /// Keep only the search columns `role` is allowed to view.
    pub fn visible_to(mut self, role: UserRole, columns: &[ColumnConfig]) -> Self {
        let visible = visible_columns(role, columns);
        self.search_columns.retain(|name| {
            visible
                .iter()
                .any(|x| x.is_masterdata && x.column_name == *name)
        });
        self
    }

    pub fn searches(&self, column: &str) -> bool {
        self.search_columns.iter().any(|x| x == column)
    }

    /// Trimmed search term, `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|x| !x.is_empty())
    }

    pub fn matches(&self, employee: &Employee) -> bool {
        if employee.is_archived && !self.include_archived {
            return false;
        }
        if employee.is_terminated && !self.include_terminated {
            return false;
        }
        let needle = match self.search_term() {
            None => return true,
            Some(search) => search.to_lowercase(),
        };
        let mut haystack = vec![];
        if self.searches("first_name") && self.searches("last_name") {
            haystack.push(Some(employee.full_name()));
        }
        if self.searches("first_name") {
            haystack.push(Some(employee.first_name.clone()));
        }
        if self.searches("last_name") {
            haystack.push(Some(employee.last_name.clone()));
        }
        if self.searches("ssn") {
            haystack.push(Some(employee.ssn.clone()));
        }
        if self.searches("email") {
            haystack.push(employee.email.clone());
        }
        haystack
            .into_iter()
            .flatten()
            .any(|x| x.to_lowercase().contains(&needle))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortState {
    /// Masterdata column name, or the storage key of a custom column.
    pub sort_by: Option<String>,
    pub descending: bool,
}

/// Snapshot of what one subscriber currently sees.
#[derive(Clone, Debug)]
pub struct ViewState {
    pub visible_ids: HashSet<Uuid>,
    pub filters: EmployeeFilters,
    pub sort: SortState,
    /// Tracked fields the subscriber may view.
    pub tracked_fields: Vec<String>,
    /// Whether notifications may carry employee names.
    pub show_names: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewImpact {
    Added,
    Removed,
    Updated { fields: Vec<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifiedChange {
    pub employee_id: Uuid,
    pub employee_name: Option<String>,
    pub impact: ViewImpact,
}

/// Fields out of `tracked` whose values differ between `old` and `new`.
pub fn changed_tracked_fields(old: &Employee, new: &Employee, tracked: &[String]) -> Vec<String> {
    tracked
        .iter()
        .filter(|field| old.field_value(field) != new.field_value(field))
        .cloned()
        .collect()
}

pub fn classify(
    old: Option<&Employee>,
    new: Option<&Employee>,
    state: &ViewState,
) -> Option<ClassifiedChange> {
    let subject = new.or(old)?;
    let was_visible = state.visible_ids.contains(&subject.id);
    let now_matches = new.map(|x| state.filters.matches(x)).unwrap_or(false);

    let impact = match (was_visible, now_matches) {
        (false, true) => ViewImpact::Added,
        (true, false) => ViewImpact::Removed,
        (true, true) => {
            let fields = match (old, new) {
                (Some(old), Some(new)) => changed_tracked_fields(old, new, &state.tracked_fields),
                _ => vec![],
            };
            if fields.is_empty() {
                return None;
            }
            ViewImpact::Updated { fields }
        }
        (false, false) => return None,
    };
    Some(ClassifiedChange {
        employee_id: subject.id,
        employee_name: state.show_names.then(|| subject.full_name()),
        impact,
    })
}

impl ViewState {
    pub fn new(filters: EmployeeFilters, visible_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            visible_ids: visible_ids.into_iter().collect(),
            filters,
            sort: SortState::default(),
            tracked_fields: TRACKED_FIELDS.iter().map(|x| x.to_string()).collect(),
            show_names: true,
        }
    }

    /// Limit tracked fields and names to what `role` can view.
    pub fn visible_to(mut self, role: UserRole, columns: &[ColumnConfig]) -> Self {
        let viewable = |name: &str| {
            columns
                .iter()
                .any(|x| x.is_masterdata && x.column_name == name && x.is_visible && can_view(role, x))
        };
        self.tracked_fields.retain(|x| viewable(x));
        self.show_names = viewable("first_name") && viewable("last_name");
        self
    }

    /// Keep the visible set in sync with a classified change.
    pub fn apply(&mut self, change: &ClassifiedChange) {
        match change.impact {
            ViewImpact::Added => {
                self.visible_ids.insert(change.employee_id);
            }
            ViewImpact::Removed => {
                self.visible_ids.remove(&change.employee_id);
            }
            ViewImpact::Updated { .. } => {}
        }
    }

    /// Classify and apply in one step.
    pub fn reconcile(
        &mut self,
        old: Option<&Employee>,
        new: Option<&Employee>,
    ) -> Option<ClassifiedChange> {
        let change = classify(old, new, self)?;
        self.apply(&change);
        Some(change)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum NotificationKind {
    Added,
    Removed,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Object)]
pub struct ViewNotification {
    pub kind: NotificationKind,
    pub count: u32,
    pub message: String,
    pub employee_ids: Vec<String>,
}

/// Impacts collected within one debounce window.
#[derive(Debug, Default)]
pub struct NotificationBatch {
    added: Vec<ClassifiedChange>,
    removed: Vec<ClassifiedChange>,
    updated: Vec<ClassifiedChange>,
}

impl NotificationBatch {
    pub fn push(&mut self, change: ClassifiedChange) {
        let bucket = match change.impact {
            ViewImpact::Added => &mut self.added,
            ViewImpact::Removed => &mut self.removed,
            ViewImpact::Updated { .. } => &mut self.updated,
        };
        // the same employee is reported once per kind
        if let Some(existing) = bucket
            .iter_mut()
            .find(|x| x.employee_id == change.employee_id)
        {
            *existing = change;
        } else {
            bucket.push(change);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    pub fn flush(&mut self) -> Vec<ViewNotification> {
        let mut notifications = vec![];
        for (kind, bucket) in [
            (NotificationKind::Added, std::mem::take(&mut self.added)),
            (NotificationKind::Removed, std::mem::take(&mut self.removed)),
            (NotificationKind::Updated, std::mem::take(&mut self.updated)),
        ] {
            if bucket.is_empty() {
                continue;
            }
            notifications.push(ViewNotification {
                kind,
                count: bucket.len() as u32,
                message: render_message(kind, &bucket),
                employee_ids: bucket.iter().map(|x| x.employee_id.to_string()).collect(),
            });
        }
        notifications
    }
}

fn render_message(kind: NotificationKind, bucket: &[ClassifiedChange]) -> String {
    if let [single] = bucket {
        let name = single
            .employee_name
            .clone()
            .unwrap_or_else(|| "An employee".to_string());
        return match kind {
            NotificationKind::Added => format!("{} now matches your filters", name),
            NotificationKind::Removed => format!("{} no longer matches your filters", name),
            NotificationKind::Updated => format!("{} was updated", name),
        };
    }
    let count = bucket.len();
    match kind {
        NotificationKind::Added => format!("{} new employees match your filters", count),
        NotificationKind::Removed => format!("{} employees no longer match your filters", count),
        NotificationKind::Updated => format!("{} employees were updated", count),
    }
}
