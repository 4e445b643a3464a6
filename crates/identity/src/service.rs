//! Account lifecycle: registration, activation, login, password reset,
//! refresh, logout, and profile lookup.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use common::{Role, UserId, bearer_token};
use doc_store::{Collection, DocumentStore, ExpiringCache, Filter, StoreError, Update};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::token::token_prefix;
use crate::user::normalize_email;
use crate::{
    Email, EmailClaim, IdentityError, Mailer, PasswordHasher, Result, TokenAuthority, TokenError,
    TokenPair, UserProfile, UserRecord,
};

const ACTIVATION_TTL_SECS: i64 = 24 * 60 * 60;
const RESET_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Identity service over a document store, a revocation cache, a password
/// hasher, and a mailer.
#[derive(Clone)]
pub struct IdentityService<S, C, H, M> {
    users: Collection<S, UserRecord>,
    emails: Collection<S, EmailClaim>,
    tokens: TokenAuthority<C>,
    hasher: H,
    mailer: M,
    public_url: String,
}

impl<S, C, H, M> IdentityService<S, C, H, M>
where
    S: DocumentStore + Clone,
    C: ExpiringCache,
    H: PasswordHasher + Clone + 'static,
    M: Mailer,
{
    pub fn new(store: S, tokens: TokenAuthority<C>, hasher: H, mailer: M) -> Self {
        Self {
            users: Collection::new(store.clone()),
            emails: Collection::new(store),
            tokens,
            hasher,
            mailer,
            public_url: "http://localhost:3000".to_string(),
        }
    }

    /// Base URL used in activation and reset links.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn tokens(&self) -> &TokenAuthority<C> {
        &self.tokens
    }

    pub fn users(&self) -> &Collection<S, UserRecord> {
        &self.users
    }

    /// Creates an inactive customer account and mails its activation link.
    #[tracing::instrument(skip_all)]
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse> {
        let name = request.name.trim().to_string();
        let email = normalize_email(&request.email);
        if name.is_empty() || email.is_empty() || request.password.is_empty() {
            return Err(IdentityError::InvalidArgument(
                "name, email and password are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(IdentityError::InvalidArgument(
                "invalid email address".to_string(),
            ));
        }

        let password_hash = self.hash_password(&request.password).await?;
        let now = Utc::now();
        let user = UserRecord {
            id: UserId::new(),
            name,
            email,
            password_hash,
            role: Role::Customer,
            is_active: false,
            activation_token: random_token(),
            activation_expires: Some(now.timestamp() + ACTIVATION_TTL_SECS),
            reset_token: String::new(),
            reset_expires: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        self.create_user(&user).await?;
        self.deliver(self.activation_email(&user)).await;

        metrics::counter!("users_registered_total").increment(1);
        tracing::info!(user_id = %user.id, "user registered");

        Ok(RegisterResponse {
            id: user.id.to_string(),
            message: "User registered successfully. Please check your email to activate your account."
                .to_string(),
        })
    }

    /// Creates an active admin account unless the email is already taken,
    /// in which case that account is promoted and activated.
    #[tracing::instrument(skip(self, password))]
    pub async fn ensure_admin(&self, name: &str, email: &str, password: &str) -> Result<UserProfile> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(IdentityError::InvalidArgument(
                "admin email and password are required".to_string(),
            ));
        }

        let promote = Update::new()
            .set("role", Role::Admin.as_str())
            .set("is_active", true)
            .set("activation_token", "")
            .set("activation_expires", Value::Null)
            .set("updated_at", Utc::now().to_rfc3339());
        if let Some(user) = self
            .users
            .find_one_and_update(&Filter::new().eq("email", email.as_str()), &promote)
            .await?
        {
            return Ok(UserProfile::from(&user));
        }

        let now = Utc::now();
        let user = UserRecord {
            id: UserId::new(),
            name: name.trim().to_string(),
            email,
            password_hash: self.hash_password(password).await?,
            role: Role::Admin,
            is_active: true,
            activation_token: String::new(),
            activation_expires: None,
            reset_token: String::new(),
            reset_expires: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        self.create_user(&user).await?;
        tracing::info!(user_id = %user.id, "admin account created");
        Ok(UserProfile::from(&user))
    }

    /// Exchanges credentials for a token pair.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let email = normalize_email(email);
        let invalid = || IdentityError::Unauthenticated("invalid email or password".to_string());

        let user = self
            .users
            .find_one(&Filter::new().eq("email", email))
            .await?
            .ok_or_else(invalid)?;

        if !user.is_active {
            return Err(IdentityError::Unauthenticated(
                "account not activated. Please check your email".to_string(),
            ));
        }
        if !self.verify_password(password, &user.password_hash).await? {
            return Err(invalid());
        }

        let pair = self.tokens.issue_pair(&user.id.to_string(), user.role)?;

        let stamped = self
            .users
            .find_one_and_update(
                &Filter::by_id(user.id),
                &Update::new().set("last_login_at", Utc::now().to_rfc3339()),
            )
            .await;
        let user = match stamped {
            Ok(Some(updated)) => updated,
            Ok(None) => user,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "failed to record last login");
                user
            }
        };

        metrics::counter!("logins_total").increment(1);

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            user: UserProfile::from(&user),
        })
    }

    /// Activates the account holding `token`. The token is single use.
    #[tracing::instrument(skip_all, fields(token_prefix = token_prefix(token)))]
    pub async fn activate(&self, token: &str) -> Result<MessageResponse> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::InvalidArgument(
                "activation token is required".to_string(),
            ));
        }

        let now = Utc::now();
        let filter = Filter::new()
            .eq("activation_token", token)
            .eq("is_active", false)
            .gt("activation_expires", now.timestamp());
        let update = Update::new()
            .set("is_active", true)
            .set("activation_token", "")
            .set("activation_expires", Value::Null)
            .set("updated_at", now.to_rfc3339());

        let user = self
            .users
            .find_one_and_update(&filter, &update)
            .await?
            .ok_or_else(|| {
                IdentityError::InvalidArgument("invalid or expired activation token".to_string())
            })?;

        tracing::info!(user_id = %user.id, "account activated");
        Ok(MessageResponse::new("Account activated successfully"))
    }

    /// Starts a password reset and mails the reset link.
    #[tracing::instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(IdentityError::InvalidArgument("email is required".to_string()));
        }

        let now = Utc::now();
        let update = Update::new()
            .set("reset_token", random_token())
            .set("reset_expires", now.timestamp() + RESET_TTL_SECS)
            .set("updated_at", now.to_rfc3339());

        let user = self
            .users
            .find_one_and_update(&Filter::new().eq("email", email), &update)
            .await?
            .ok_or_else(|| IdentityError::NotFound("user not found".to_string()))?;

        self.deliver(self.reset_email(&user)).await;

        Ok(MessageResponse::new(
            "Password reset instructions have been sent to your email",
        ))
    }

    /// Sets a new password using a pending reset token. The token is single use.
    #[tracing::instrument(skip_all, fields(token_prefix = token_prefix(token)))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<MessageResponse> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::InvalidArgument("reset token is required".to_string()));
        }
        if new_password.is_empty() {
            return Err(IdentityError::InvalidArgument(
                "new password is required".to_string(),
            ));
        }

        let password_hash = self.hash_password(new_password).await?;
        let now = Utc::now();
        let filter = Filter::new()
            .eq("reset_token", token)
            .gt("reset_expires", now.timestamp());
        let update = Update::new()
            .set("password_hash", password_hash)
            .set("reset_token", "")
            .set("reset_expires", Value::Null)
            .set("updated_at", now.to_rfc3339());

        self.users
            .find_one_and_update(&filter, &update)
            .await?
            .ok_or_else(|| {
                IdentityError::InvalidArgument("invalid or expired reset token".to_string())
            })?;

        Ok(MessageResponse::new("Password has been reset successfully"))
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let token = bearer_token(refresh_token);
        if token.is_empty() {
            return Err(IdentityError::Unauthenticated(
                "refresh token is required".to_string(),
            ));
        }
        self.tokens.refresh(token).await.map_err(|e| {
            if e.is_infrastructure() {
                IdentityError::Token(e)
            } else {
                IdentityError::Unauthenticated("invalid refresh token".to_string())
            }
        })
    }

    /// Revokes `token` for the rest of its lifetime.
    pub async fn logout(&self, token: &str) -> Result<MessageResponse> {
        let token = bearer_token(token);
        if token.is_empty() {
            return Err(IdentityError::InvalidArgument("token is required".to_string()));
        }
        self.tokens.revoke(token).await.map_err(|e| {
            if e.is_infrastructure() {
                IdentityError::Token(e)
            } else {
                IdentityError::InvalidArgument("invalid token".to_string())
            }
        })?;
        Ok(MessageResponse::new("Successfully logged out"))
    }

    /// Resolves an `Authorization` header value into the caller's profile.
    pub async fn get_me(&self, authorization: &str) -> Result<UserProfile> {
        let token = bearer_token(authorization);
        if token.is_empty() {
            return Err(IdentityError::Unauthenticated("no token provided".to_string()));
        }

        let claims = self.tokens.authenticate(token).await.map_err(|e| match e {
            e if e.is_infrastructure() => IdentityError::Token(e),
            TokenError::Revoked => IdentityError::Unauthenticated("token has been revoked".to_string()),
            TokenError::Expired => IdentityError::Unauthenticated("token has expired".to_string()),
            _ => IdentityError::Unauthenticated("invalid token".to_string()),
        })?;

        let user = self
            .users
            .get(&claims.sub)
            .await?
            .ok_or_else(|| IdentityError::Unauthenticated("invalid token".to_string()))?;

        Ok(UserProfile::from(&user))
    }

    /// Claims the email, then stores the user. Releases the claim if the
    /// user cannot be stored.
    async fn create_user(&self, user: &UserRecord) -> Result<()> {
        let claim = EmailClaim {
            id: user.email.clone(),
            user_id: user.id,
        };
        match self.emails.insert(&claim).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                return Err(IdentityError::AlreadyExists(
                    "user with this email already exists".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.users.insert(user).await {
            let release = Filter::by_id(&user.email).eq("user_id", user.id.to_string());
            if let Err(release_err) = self.emails.delete_one(&release).await {
                tracing::error!(error = %release_err, "failed to release email claim");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| IdentityError::Internal(e.to_string()))?
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| IdentityError::Internal(e.to_string()))?
    }

    async fn deliver(&self, email: Email) {
        let to = email.to.clone();
        if let Err(e) = self.mailer.send(email).await {
            metrics::counter!("emails_failed_total").increment(1);
            tracing::warn!(%to, error = %e, "email delivery failed");
        }
    }

    fn activation_email(&self, user: &UserRecord) -> Email {
        Email {
            to: user.email.clone(),
            subject: "Activate your account".to_string(),
            body: format!(
                "Hi {},\n\nActivate your account: {}/activate?token={}\n\nThe link expires in 24 hours.\n",
                user.name, self.public_url, user.activation_token
            ),
        }
    }

    fn reset_email(&self, user: &UserRecord) -> Email {
        Email {
            to: user.email.clone(),
            subject: "Reset your password".to_string(),
            body: format!(
                "Hi {},\n\nReset your password: {}/reset-password?token={}\n\nThe link expires in 1 hour.\n",
                user.name, self.public_url, user.reset_token
            ),
        }
    }
}

/// 32 random bytes, URL-safe base64.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use doc_store::{InMemoryDocumentStore, InMemoryExpiringCache};

    use super::*;
    use crate::{BcryptHasher, RecordingMailer, TokenConfig};

    type Service =
        IdentityService<InMemoryDocumentStore, InMemoryExpiringCache, BcryptHasher, RecordingMailer>;

    fn service() -> (Service, RecordingMailer) {
        let mailer = RecordingMailer::new();
        let tokens = TokenAuthority::new(TokenConfig::new("secret"), InMemoryExpiringCache::new());
        let service = IdentityService::new(
            InMemoryDocumentStore::new(),
            tokens,
            BcryptHasher::new(4),
            mailer.clone(),
        )
        .with_public_url("https://shop.example/");
        (service, mailer)
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
        }
    }

    async fn stored(service: &Service, email: &str) -> UserRecord {
        service
            .users()
            .find_one(&Filter::new().eq("email", email))
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn random_tokens_are_url_safe_and_unique() {
        let a = random_token();
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, random_token());
    }

    #[tokio::test]
    async fn register_creates_inactive_customer_and_mails_link() {
        let (service, mailer) = service();
        let response = service.register(request("Ada@Example.com")).await.unwrap();
        assert!(response.message.starts_with("User registered successfully"));

        let user = stored(&service, "ada@example.com").await;
        assert_eq!(user.id.to_string(), response.id);
        assert!(!user.is_active);
        assert_eq!(user.role, Role::Customer);
        assert_ne!(user.password_hash, "correct horse");
        assert!(!user.activation_token.is_empty());

        let email = mailer.last_to("ada@example.com").await.unwrap();
        assert!(email.body.contains(&format!(
            "https://shop.example/activate?token={}",
            user.activation_token
        )));
    }

    #[tokio::test]
    async fn register_rejects_missing_fields() {
        let (service, _) = service();
        let mut req = request("ada@example.com");
        req.password.clear();
        assert!(matches!(
            service.register(req).await,
            Err(IdentityError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.register(request("not-an-email")).await,
            Err(IdentityError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let (service, _) = service();
        service.register(request("ada@example.com")).await.unwrap();
        assert!(matches!(
            service.register(request("ADA@example.com")).await,
            Err(IdentityError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_registrations_of_one_email_create_one_user() {
        let (service, _) = service();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.register(request("race@example.com")).await.is_ok()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(
            service
                .users()
                .count(&Filter::new().eq("email", "race@example.com"))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_registration() {
        let (service, mailer) = service();
        mailer.set_fail(true);
        assert!(service.register(request("ada@example.com")).await.is_ok());
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn login_requires_activation_before_password_check() {
        let (service, _) = service();
        service.register(request("ada@example.com")).await.unwrap();

        let err = service.login("ada@example.com", "wrong").await.unwrap_err();
        assert!(
            matches!(err, IdentityError::Unauthenticated(ref msg) if msg.starts_with("account not activated"))
        );
    }

    #[tokio::test]
    async fn activation_is_single_use() {
        let (service, _) = service();
        service.register(request("ada@example.com")).await.unwrap();
        let token = stored(&service, "ada@example.com").await.activation_token;

        service.activate(&token).await.unwrap();
        let user = stored(&service, "ada@example.com").await;
        assert!(user.is_active);
        assert!(user.activation_token.is_empty());

        assert!(matches!(
            service.activate(&token).await,
            Err(IdentityError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.activate("").await,
            Err(IdentityError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn expired_activation_token_is_rejected() {
        let (service, _) = service();
        service.register(request("ada@example.com")).await.unwrap();
        let user = stored(&service, "ada@example.com").await;
        service
            .users()
            .find_one_and_update(
                &Filter::by_id(user.id),
                &Update::new().set("activation_expires", Utc::now().timestamp() - 1),
            )
            .await
            .unwrap();

        assert!(service.activate(&user.activation_token).await.is_err());
    }

    #[tokio::test]
    async fn login_checks_password_and_stamps_last_login() {
        let (service, _) = service();
        service.register(request("ada@example.com")).await.unwrap();
        let token = stored(&service, "ada@example.com").await.activation_token;
        service.activate(&token).await.unwrap();

        let err = service.login("ada@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated(ref msg) if msg == "invalid email or password"));

        let err = service.login("nobody@example.com", "x").await.unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated(ref msg) if msg == "invalid email or password"));

        let login = service.login(" ADA@example.com", "correct horse").await.unwrap();
        assert_eq!(login.expires_in, 3600);
        assert!(login.user.last_login_at.is_some());

        let claims = service.tokens().verify(&login.access_token).unwrap();
        assert_eq!(claims.sub, login.user.id);
        assert_eq!(claims.role, Role::Customer);
    }

    #[tokio::test]
    async fn get_me_resolves_and_logout_revokes() {
        let (service, _) = service();
        let admin = service
            .ensure_admin("Root", "root@example.com", "pw")
            .await
            .unwrap();
        let login = service.login("root@example.com", "pw").await.unwrap();

        let me = service
            .get_me(&format!("Bearer {}", login.access_token))
            .await
            .unwrap();
        assert_eq!(me.id, admin.id);
        assert_eq!(me.role, Role::Admin);

        service.logout(&login.access_token).await.unwrap();
        let err = service.get_me(&login.access_token).await.unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated(ref msg) if msg.contains("revoked")));
    }

    #[tokio::test]
    async fn get_me_rejects_missing_and_garbage_tokens() {
        let (service, _) = service();
        assert!(matches!(
            service.get_me("").await,
            Err(IdentityError::Unauthenticated(ref msg)) if msg == "no token provided"
        ));
        assert!(matches!(
            service.get_me("Bearer nope").await,
            Err(IdentityError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn get_me_rejects_token_for_deleted_user() {
        let (service, _) = service();
        service.ensure_admin("Root", "root@example.com", "pw").await.unwrap();
        let login = service.login("root@example.com", "pw").await.unwrap();
        service
            .users()
            .delete_one(&Filter::by_id(&login.user.id))
            .await
            .unwrap();

        assert!(matches!(
            service.get_me(&login.access_token).await,
            Err(IdentityError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn logout_with_invalid_token_is_invalid_argument() {
        let (service, _) = service();
        assert!(matches!(
            service.logout("garbage").await,
            Err(IdentityError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn logout_surfaces_cache_outage() {
        let (service, _) = service();
        service.ensure_admin("Root", "root@example.com", "pw").await.unwrap();
        let login = service.login("root@example.com", "pw").await.unwrap();
        service.tokens().cache().set_unavailable(true);

        let status: common::Status = service.logout(&login.access_token).await.unwrap_err().into();
        assert_eq!(status.code, common::Code::Internal);
    }

    #[tokio::test]
    async fn refresh_issues_a_new_pair() {
        let (service, _) = service();
        service.ensure_admin("Root", "root@example.com", "pw").await.unwrap();
        let login = service.login("root@example.com", "pw").await.unwrap();

        let pair = service.refresh_token(&login.refresh_token).await.unwrap();
        assert!(service.get_me(&pair.access_token).await.is_ok());
        assert!(matches!(
            service.refresh_token(&login.access_token).await,
            Err(IdentityError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn forgot_and_reset_password() {
        let (service, mailer) = service();
        service.ensure_admin("Root", "root@example.com", "old-pw").await.unwrap();

        assert!(matches!(
            service.forgot_password("ghost@example.com").await,
            Err(IdentityError::NotFound(_))
        ));

        service.forgot_password("root@example.com").await.unwrap();
        let token = stored(&service, "root@example.com").await.reset_token;
        assert!(!token.is_empty());
        assert!(mailer
            .last_to("root@example.com")
            .await
            .unwrap()
            .body
            .contains(&token));

        service.reset_password(&token, "new-pw").await.unwrap();
        assert!(service.login("root@example.com", "old-pw").await.is_err());
        assert!(service.login("root@example.com", "new-pw").await.is_ok());

        assert!(matches!(
            service.reset_password(&token, "again").await,
            Err(IdentityError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let (service, _) = service();
        service.ensure_admin("Root", "root@example.com", "pw").await.unwrap();
        service.forgot_password("root@example.com").await.unwrap();
        let user = stored(&service, "root@example.com").await;
        service
            .users()
            .find_one_and_update(
                &Filter::by_id(user.id),
                &Update::new().set("reset_expires", Utc::now().timestamp() - 5),
            )
            .await
            .unwrap();

        assert!(service.reset_password(&user.reset_token, "x").await.is_err());
        assert!(service.login("root@example.com", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn ensure_admin_promotes_existing_account() {
        let (service, _) = service();
        service.register(request("ada@example.com")).await.unwrap();

        let profile = service
            .ensure_admin("Ada", "ada@example.com", "ignored")
            .await
            .unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert!(profile.is_active);
        assert!(service.login("ada@example.com", "correct horse").await.is_ok());
    }
}
