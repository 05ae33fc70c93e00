use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    User,
    Admin,
}

/// Lifecycle of one (test, student) pairing.
///
/// `Submitted` and `Expired` are absorbing. Every persisted transition goes through a
/// compare-and-set `UPDATE` whose `WHERE` clause mirrors [`AssignmentStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "assignmentstatus", rename_all = "snake_case")]
pub(crate) enum AssignmentStatus {
    Assigned,
    InProgress,
    Submitted,
    Expired,
}

impl AssignmentStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Submitted => "submitted",
            AssignmentStatus::Expired => "expired",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "assigned" => Some(AssignmentStatus::Assigned),
            "in_progress" => Some(AssignmentStatus::InProgress),
            "submitted" => Some(AssignmentStatus::Submitted),
            "expired" => Some(AssignmentStatus::Expired),
            _ => None,
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        match self {
            AssignmentStatus::Assigned | AssignmentStatus::InProgress => false,
            AssignmentStatus::Submitted | AssignmentStatus::Expired => true,
        }
    }

    pub(crate) fn can_transition_to(self, next: AssignmentStatus) -> bool {
        match (self, next) {
            (AssignmentStatus::Assigned, AssignmentStatus::InProgress) => true,
            (
                AssignmentStatus::Assigned | AssignmentStatus::InProgress,
                AssignmentStatus::Submitted | AssignmentStatus::Expired,
            ) => true,
            (AssignmentStatus::Assigned, AssignmentStatus::Assigned)
            | (AssignmentStatus::InProgress, _)
            | (AssignmentStatus::Submitted, _)
            | (AssignmentStatus::Expired, _) => false,
        }
    }
}
