use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DownloadTokenResponse {
    pub token: String,
}
