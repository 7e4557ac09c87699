//! OAuth2 credentials and the background token refresher.

mod credentials;
mod google;
pub mod mock;
mod refresher;

pub use credentials::{AccessToken, ClientSecret, CredentialStore, GOOGLE_TOKEN_URI, StoredCredentials};
pub use google::{GoogleTokenEndpoint, parse_token_response};
pub use refresher::{
    LocalTokenEndpoint, ReauthRequest, ReauthTrigger, TokenEndpoint, TokenGrant, TokenHandle,
    TokenRefresher,
};
