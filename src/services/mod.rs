pub mod auth;
pub mod download_token;
pub mod keycloak;
pub mod proxy;
