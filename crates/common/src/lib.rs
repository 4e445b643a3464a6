//! Types shared by every storefront service.
//!
//! Identifiers, money, the cross-service error taxonomy ([`Status`]),
//! request deadlines, and the [`RoleResolver`] capability used to ask the
//! identity service who a caller is.

pub mod deadline;
pub mod principal;
pub mod status;
pub mod types;

pub use deadline::{Deadline, TIMEOUT_HEADER};
pub use principal::{Principal, Role, RoleResolver, StaticRoleResolver, bearer_token};
pub use status::{Code, Status};
pub use types::{Money, OrderId, OrderLine, ProductId, UserId};
