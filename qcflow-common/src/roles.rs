//! Roles and the static permission table
//!
//! Each role maps to a fixed allow-list of permission strings. There is no
//! hierarchy, no wildcard and no deny rule. Lookups are pure: an unknown role
//! or an unknown permission yields `false`, never an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "kebab-case"))]
pub enum Role {
    LabAnalyst,
    ProductionAnalyst,
    Manager,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::LabAnalyst,
        Role::ProductionAnalyst,
        Role::Manager,
        Role::Administrator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::LabAnalyst => "lab-analyst",
            Role::ProductionAnalyst => "production-analyst",
            Role::Manager => "manager",
            Role::Administrator => "administrator",
        }
    }

    /// Permissions granted to this role
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::LabAnalyst => &[
                ProcessesRead,
                LabDataRead,
                LabDataWrite,
                RootCauseRead,
                NotificationsRead,
            ],
            Role::ProductionAnalyst => &[
                ProcessesRead,
                ProductionDataRead,
                ProductionDataWrite,
                RootCauseRead,
                NotificationsRead,
            ],
            Role::Manager => &[
                ProcessesRead,
                ProcessesWrite,
                LabDataRead,
                ProductionDataRead,
                RootCauseRead,
                RootCauseWrite,
                FeedbackRead,
                FeedbackWrite,
                ModelTrain,
                NotificationsRead,
                NotificationsWrite,
                StatisticsRead,
            ],
            Role::Administrator => &[
                ProcessesRead,
                LabDataRead,
                ProductionDataRead,
                RootCauseRead,
                FeedbackRead,
                NotificationsRead,
                NotificationsWrite,
                StatisticsRead,
                UsersRead,
                UsersWrite,
            ],
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Permission strings checked by the route guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ProcessesRead,
    ProcessesWrite,
    LabDataRead,
    LabDataWrite,
    ProductionDataRead,
    ProductionDataWrite,
    RootCauseRead,
    RootCauseWrite,
    FeedbackRead,
    FeedbackWrite,
    ModelTrain,
    NotificationsRead,
    NotificationsWrite,
    StatisticsRead,
    UsersRead,
    UsersWrite,
}

impl Permission {
    pub const ALL: [Permission; 16] = [
        Permission::ProcessesRead,
        Permission::ProcessesWrite,
        Permission::LabDataRead,
        Permission::LabDataWrite,
        Permission::ProductionDataRead,
        Permission::ProductionDataWrite,
        Permission::RootCauseRead,
        Permission::RootCauseWrite,
        Permission::FeedbackRead,
        Permission::FeedbackWrite,
        Permission::ModelTrain,
        Permission::NotificationsRead,
        Permission::NotificationsWrite,
        Permission::StatisticsRead,
        Permission::UsersRead,
        Permission::UsersWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ProcessesRead => "processes:read",
            Permission::ProcessesWrite => "processes:write",
            Permission::LabDataRead => "lab-data:read",
            Permission::LabDataWrite => "lab-data:write",
            Permission::ProductionDataRead => "production-data:read",
            Permission::ProductionDataWrite => "production-data:write",
            Permission::RootCauseRead => "root-cause:read",
            Permission::RootCauseWrite => "root-cause:write",
            Permission::FeedbackRead => "feedback:read",
            Permission::FeedbackWrite => "feedback:write",
            Permission::ModelTrain => "model:train",
            Permission::NotificationsRead => "notifications:read",
            Permission::NotificationsWrite => "notifications:write",
            Permission::StatisticsRead => "statistics:read",
            Permission::UsersRead => "users:read",
            Permission::UsersWrite => "users:write",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Name that matches no known role or permission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown name: {0}")]
pub struct UnknownName(pub String);

/// Check whether `role` grants `permission`, both given as strings
///
/// # Examples
///
/// ```
/// use qcflow_common::roles::has_permission;
///
/// assert!(has_permission("lab-analyst", "lab-data:write"));
/// assert!(!has_permission("lab-analyst", "production-data:write"));
/// assert!(!has_permission("auditor", "lab-data:read"));
/// ```
pub fn has_permission(role: &str, permission: &str) -> bool {
    match (role.parse::<Role>(), permission.parse::<Permission>()) {
        (Ok(role), Ok(permission)) => role.allows(permission),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_names() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>().unwrap(), permission);
        }
    }

    #[test]
    fn test_analysts_only_write_their_own_data() {
        assert!(has_permission("lab-analyst", "lab-data:write"));
        assert!(!has_permission("lab-analyst", "production-data:write"));
        assert!(has_permission("production-analyst", "production-data:write"));
        assert!(!has_permission("production-analyst", "lab-data:write"));
    }

    #[test]
    fn test_manager_runs_root_cause_and_training() {
        assert!(has_permission("manager", "root-cause:write"));
        assert!(has_permission("manager", "feedback:write"));
        assert!(has_permission("manager", "model:train"));
        assert!(!has_permission("manager", "users:write"));
    }

    #[test]
    fn test_administrator_manages_users_not_workflow() {
        assert!(has_permission("administrator", "users:write"));
        assert!(has_permission("administrator", "statistics:read"));
        assert!(!has_permission("administrator", "root-cause:write"));
        assert!(!has_permission("administrator", "lab-data:write"));
    }

    #[test]
    fn test_unknown_names_are_denied() {
        assert!(!has_permission("", ""));
        assert!(!has_permission("superuser", "users:write"));
        assert!(!has_permission("manager", "everything:*"));
        assert!(!has_permission("Manager", "processes:read"));
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Role::ProductionAnalyst).unwrap();
        assert_eq!(json, "\"production-analyst\"");
    }
}
