use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;
use crate::error::Result;

text_enum! {
    pub enum UserType ("Tipo utente") {
        Client => "client",
        Provider => "provider",
        Admin => "admin",
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub user_type: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn kind(&self) -> Result<UserType> {
        self.user_type.parse()
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin.as_str()
    }
}

/// Called by the SPA right after Supabase sign-up. The id and email come
/// from the verified token, not from the body.
#[derive(Debug, Deserialize)]
pub struct SyncUserRequest {
    pub user_type: UserType,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_type_round_trips_through_text() {
        for kind in UserType::ALL {
            assert_eq!(kind.as_str().parse::<UserType>().unwrap(), *kind);
        }
        assert!("superuser".parse::<UserType>().is_err());
    }

    #[test]
    fn sync_request_uses_snake_case_names() {
        let req: SyncUserRequest = serde_json::from_str(r#"{"user_type":"provider"}"#).unwrap();
        assert_eq!(req.user_type, UserType::Provider);
        assert!(req.full_name.is_none());
    }
}
