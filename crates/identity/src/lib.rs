//! Identity service: accounts, session tokens, and revocation.
//!
//! [`TokenAuthority`] issues and verifies signed access/refresh tokens and
//! records revocations in an [`ExpiringCache`](doc_store::ExpiringCache).
//! [`IdentityService`] implements the account lifecycle on top of it, and
//! [`LocalRoleResolver`] lets co-located services resolve callers without a
//! network hop.

pub mod error;
pub mod mailer;
pub mod password;
pub mod resolver;
pub mod service;
pub mod token;
pub mod user;

pub use error::{IdentityError, Result};
pub use mailer::{Email, LogMailer, Mailer, RecordingMailer};
pub use password::{BcryptHasher, PasswordHasher};
pub use resolver::LocalRoleResolver;
pub use service::{
    IdentityService, LoginResponse, MessageResponse, RegisterRequest, RegisterResponse,
};
pub use token::{Claims, TokenAuthority, TokenConfig, TokenError, TokenKind, TokenPair};
pub use user::{EmailClaim, UserProfile, UserRecord};
