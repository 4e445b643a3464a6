use chrono::{DateTime, Utc};
use common::{Role, UserId};
use doc_store::Document;
use serde::{Deserialize, Serialize};

/// Stored account. Expiry fields are unix seconds so filters can compare
/// them numerically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    /// Empty once used.
    #[serde(default)]
    pub activation_token: String,
    #[serde(default)]
    pub activation_expires: Option<i64>,
    /// Empty when no reset is pending.
    #[serde(default)]
    pub reset_token: String,
    #[serde(default)]
    pub reset_expires: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Document for UserRecord {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> String {
        self.id.to_string()
    }
}

/// Claim on an email address. Inserting it is what makes registration
/// unique per email, since the store rejects duplicate ids atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailClaim {
    /// The normalized email.
    pub id: String,
    pub user_id: UserId,
}

impl Document for EmailClaim {
    const COLLECTION: &'static str = "user_emails";

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Lowercases and trims an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
