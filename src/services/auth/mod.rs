pub mod access_jwt;
pub mod claims;
pub mod factory;
pub mod gate;
pub mod key_source;

pub use access_jwt::{AuthService, TokenError, TokenSettings, ValidationError};
pub use factory::build_auth_service;
pub use key_source::{KeySource, RealmKeySource, StaticKey};
