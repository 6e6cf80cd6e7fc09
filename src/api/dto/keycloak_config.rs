use serde::Serialize;

use crate::state::IdpSettings;

/// What the SPA needs to run its own login against Keycloak.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakConfigResponse {
    pub client_id: String,
    pub realm: String,
    pub url: String,
}

impl From<&IdpSettings> for KeycloakConfigResponse {
    fn from(idp: &IdpSettings) -> Self {
        Self {
            client_id: idp.client_id.clone(),
            realm: idp.realm.clone(),
            url: idp.url.clone(),
        }
    }
}
