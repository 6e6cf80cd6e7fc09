pub mod access;

pub use access::{access_middleware, bearer_token};
