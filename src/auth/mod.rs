// Authentication module
// Manages AAD sign-in, token lifecycle and the local token cache

mod credentials;
mod manager;
mod oauth;
mod refresh;
mod store;
mod types;

pub use credentials::{open_store, Credentials};
pub use manager::{AuthManager, DEFAULT_REFRESH_THRESHOLD};
pub use oauth::AzureOAuth;
pub use store::TokenStore;
pub use types::{AadSettings, Token};
