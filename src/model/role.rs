use std::{fmt, str::FromStr};

use poem_openapi::Enum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum UserRole {
    HrAdmin,
    Sodexo,
    Omc,
    Payroll,
    Toplux,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::HrAdmin,
        UserRole::Sodexo,
        UserRole::Omc,
        UserRole::Payroll,
        UserRole::Toplux,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::HrAdmin => "hr_admin",
            UserRole::Sodexo => "sodexo",
            UserRole::Omc => "omc",
            UserRole::Payroll => "payroll",
            UserRole::Toplux => "toplux",
        }
    }

    pub fn is_hr_admin(&self) -> bool {
        matches!(self, UserRole::HrAdmin)
    }

    /// External parties are every role except HR Admin.
    pub fn is_external_party(&self) -> bool {
        !self.is_hr_admin()
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hr_admin" => Ok(UserRole::HrAdmin),
            "sodexo" => Ok(UserRole::Sodexo),
            "omc" | "ömc" => Ok(UserRole::Omc),
            "payroll" => Ok(UserRole::Payroll),
            "toplux" => Ok(UserRole::Toplux),
            other => Err(anyhow::anyhow!("unknown role: {}", other)),
        }
    }
}

impl TryFrom<String> for UserRole {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_str() {
        for role in UserRole::ALL {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
    }

    #[test]
    fn test_role_parse_is_lenient() {
        assert_eq!(" HR_ADMIN ".parse::<UserRole>().unwrap(), UserRole::HrAdmin);
        assert_eq!("ÖMC".parse::<UserRole>().unwrap(), UserRole::Omc);
        assert!("manager".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_external_party() {
        assert!(!UserRole::HrAdmin.is_external_party());
        assert!(UserRole::Sodexo.is_external_party());
        assert!(UserRole::Toplux.is_external_party());
    }
}
