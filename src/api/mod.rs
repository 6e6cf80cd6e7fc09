/*
 * Responsibility
 * - HTTP 境界 (routes / handlers / DTO / extractors)
 * - router() の re-export
 */
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod route_table;
mod routes;

pub use route_table::RouteTable;
pub use routes::router;
