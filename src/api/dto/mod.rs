pub mod download;
pub mod keycloak_config;
pub mod users;
