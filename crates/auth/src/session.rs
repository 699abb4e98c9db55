use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use routekit_core::UserId;

use crate::{Role, SessionClaims};

/// The user a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl SessionUser {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            name: None,
            roles: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// True when the user holds at least one of `roles`.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.roles.iter().any(|r| r.is_any_of(roles))
    }
}

/// A resolved, currently valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: SessionUser,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionClaims> for Session {
    fn from(claims: SessionClaims) -> Self {
        let issued_at = claims.issued_at();
        let expires_at = claims.expires_at();
        Self {
            user: SessionUser {
                id: claims.sub,
                email: claims.email,
                name: claims.name,
                roles: claims.roles,
            },
            issued_at,
            expires_at,
        }
    }
}
