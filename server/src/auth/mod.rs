pub mod oauth;
pub mod session_store;
pub mod token_store;

pub use session_store::AuthStateStore;
pub use token_store::{CredentialProvider, StoredToken, TokenStore};
