//! Signed-in participant and their access token.

pub mod credentials;
mod model;
mod repository;

pub use credentials::{CredentialError, CredentialResult};
pub use model::CurrentUser;
pub use repository::SessionRepository;
