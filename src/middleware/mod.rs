/*
 * Responsibility
 * - middleware の公開インターフェース (re-export)
 * - auth (bearer 検証), cors, http (request-id / trace / body limit / timeout)
 */
pub mod auth;
pub mod cors;
pub mod http;
