mod callback;
pub mod error;
mod http;
pub mod oauth;
pub mod oura;
pub mod planta;
pub mod token_store;

pub use error::{ApiError, AuthError};
pub use http::http_client;
pub use oauth::{AuthState, OAuthManager, TokenExchange};
pub use oura::{OuraClient, OuraExchange};
pub use planta::{PlantaClient, PlantaExchange};
pub use token_store::{Credential, TokenStore};
