use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Clinic role carried in the `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl User {
    /// Unknown or missing roles are treated as patients.
    pub fn clinic_role(&self) -> Role {
        match self.role.as_deref() {
            Some("admin") => Role::Admin,
            Some("doctor") => Role::Doctor,
            _ => Role::Patient,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.clinic_role(), Role::Doctor | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.clinic_role() == Role::Admin
    }
}
