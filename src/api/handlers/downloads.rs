/*
 * Responsibility
 * - GET {prefix}/objects/{id}/{filename}: 認証済みユーザーに download token を発行
 *   - 発行前に upstream (objects API) でその object が見えることを確認する
 * - GET {prefix}/objects/download/{token}: token だけで file を stream する (Bearer 不要)
 *   - ブラウザの <a href> から直接叩けるようにするため
 */
use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::PathRejection},
    http::{HeaderMap, HeaderValue, Method, Request, header},
    response::Response,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use uuid::Uuid;

use crate::{
    api::{dto::download::DownloadTokenResponse, extractors::Identity},
    error::AppError,
    services::proxy::{
        self, Forwarding, IdentityHeaders, UpstreamResponse, headers::request_headers,
        url_with_segments,
    },
    state::AppState,
};

pub async fn issue_download_token(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    path: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<DownloadTokenResponse>, AppError> {
    let Path((id, filename)) = path?;
    if filename.is_empty() || filename.contains('/') {
        return Err(AppError::BadRequest("invalid filename".into()));
    }

    let object_id = id.to_string();
    let url = url_with_segments(&state.upstreams.objects, &["v1", "objects", &object_id])?;
    let headers = request_headers(&HeaderMap::new(), Some(&ctx), IdentityHeaders::AdminFlag)?;

    let UpstreamResponse { response, .. } = state
        .upstream
        .execute(Method::GET, url, headers, Body::empty())
        .await?;

    let status = response.status();
    if !status.is_success() {
        tracing::info!(%status, object_id = %object_id, sub = ctx.subject_id(), "download refused by upstream");
        return Err(AppError::UpstreamRejected {
            status,
            detail: format!("object {} is not accessible", object_id),
        });
    }

    let issued = state.downloads.issue(id, &filename, state.downloads.ttl())?;
    tracing::info!(
        object_id = %object_id,
        filename = %filename,
        sub = ctx.subject_id(),
        expires_at = %issued.expires_at,
        "download token issued"
    );

    Ok(Json(DownloadTokenResponse {
        token: issued.token,
    }))
}

pub async fn download(
    State(state): State<AppState>,
    Path(token): Path<String>,
    req: Request<Body>,
) -> Result<Response, AppError> {
    let grant = state.downloads.verify(&token).inspect_err(|err| {
        tracing::warn!(error = %err, "download token rejected");
    })?;

    let object_id = grant.resource_id.to_string();
    let url = url_with_segments(
        &state.upstreams.objects,
        &["v1", "objects", &object_id, &grant.filename],
    )?;

    // The link carries no identity; none is forwarded.
    let forwarding = Forwarding {
        identity_headers: IdentityHeaders::None,
        paginated: false,
    };
    let mut res = proxy::forward(&state.upstream, url, req, None, forwarding).await?;

    if res.status().is_success()
        && let Ok(value) = HeaderValue::from_str(&content_disposition(&grant.filename))
    {
        res.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(res)
}

/// RFC 5987 `attr-char`: everything else in `filename*` is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `attachment; filename="<ascii fallback>"; filename*=UTF-8''<percent-encoded>`
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, ATTR_CHAR)
    )
}
