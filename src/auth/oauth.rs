// Azure Active Directory sign-in flows

use reqwest::Client;
use url::Url;

use super::credentials::Credentials;
use super::refresh;
use super::types::AadSettings;
use crate::config::Configuration;
use crate::error::{BatchAppsError, Result};
use crate::utils::{http_url, https_url};

/// Entry points for creating an authenticated session
pub struct AzureOAuth;

impl AzureOAuth {
    /// Continue the session stored for the configured client
    pub fn get_session(config: &Configuration) -> Result<Credentials> {
        let settings = AadSettings::from_map(&config.auth_settings(false)?);
        Credentials::new(config, &settings.client_id, None)
    }

    /// Continue the stored unattended session for the configured account
    pub fn get_stored_unattended_session(config: &Configuration) -> Result<Credentials> {
        let settings = AadSettings::from_map(&config.auth_settings(true)?);
        let (client_id, _) = unattended_identity(&settings)?;
        Credentials::new(config, &client_id, None)
    }

    /// Build the URL a user opens to sign in
    ///
    /// Returns the URL and the state value to check the redirect against.
    pub fn get_authorization_url(
        config: &Configuration,
        msa: bool,
        prompt: bool,
        extra: &[(&str, &str)],
    ) -> Result<(String, String)> {
        let settings = AadSettings::from_map(&config.auth_settings(false)?);
        let state = uuid::Uuid::new_v4().simple().to_string();

        let mut url = Url::parse(&settings.authorize_url()).map_err(|e| {
            BatchAppsError::Auth(format!("Failed to generate auth url. Error: {}", e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &settings.client_id)
                .append_pair("redirect_uri", &http_url(&settings.redirect_uri, &[]))
                .append_pair("state", &state)
                .append_pair("resource", &settings.resource_url());
            if msa {
                query.append_pair("domain_hint", "live.com");
            }
            if prompt {
                query.append_pair("prompt", "login");
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }

        tracing::debug!("Generated authorization URL {}", url);
        Ok((url.to_string(), state))
    }

    /// Complete an interactive sign-in from the URL the browser was redirected to
    pub async fn get_authorization_token(
        config: &Configuration,
        redirect_response: &str,
        state: Option<&str>,
    ) -> Result<Credentials> {
        let settings = AadSettings::from_map(&config.auth_settings(false)?);
        let code = authorization_code(&settings.redirect_uri, redirect_response, state)?;

        let token = refresh::exchange_code(
            &oauth_client()?,
            &settings.token_url(&settings.tenant),
            &settings.client_id,
            &code,
            &http_url(&settings.redirect_uri, &[]),
            &settings.resource_url(),
        )
        .await?;

        let client_id = settings.client_id.clone();
        Credentials::new(config, &client_id, Some(token))
    }

    /// Sign in with the unattended account from the configuration
    pub async fn get_unattended_session(config: &Configuration) -> Result<Credentials> {
        let settings = AadSettings::from_map(&config.auth_settings(true)?);
        let (client_id, tenant) = unattended_identity(&settings)?;

        let token = refresh::client_credentials(
            &oauth_client()?,
            &settings.token_url(&tenant),
            &client_id,
            &settings.unattended_key,
            &settings.resource_url(),
        )
        .await?;

        Credentials::new(config, &client_id, Some(token))
    }
}

pub(crate) fn oauth_client() -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| BatchAppsError::Auth(format!("Failed to create HTTP client: {}", e)))
}

fn unattended_identity(settings: &AadSettings) -> Result<(String, String)> {
    settings.unattended_identity().ok_or_else(|| {
        BatchAppsError::InvalidConfig(
            "Unattended Account must be in the format ClientID=abc;TenantID=xyz".to_string(),
        )
    })
}

/// Extract the authorization code from the redirect URL
fn authorization_code(redirect_uri: &str, response: &str, state: Option<&str>) -> Result<String> {
    let response = response.trim();
    let full = if response.starts_with(&http_url(redirect_uri, &[])) {
        https_url(response, &[])
    } else if !response.starts_with(&https_url(redirect_uri, &[])) {
        format!("{}{}", https_url(redirect_uri, &[]), response)
    } else {
        response.to_string()
    };

    let url = Url::parse(&full)
        .map_err(|e| BatchAppsError::Auth(format!("Invalid redirect URL: {}", e)))?;

    let mut code = None;
    let mut returned_state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => returned_state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(BatchAppsError::Auth(description.unwrap_or(error)));
    }

    if let Some(expected) = state {
        if returned_state.as_deref() != Some(expected) {
            return Err(BatchAppsError::Auth(
                "Mismatching state, CSRF Warning! State not equal in request and response."
                    .to_string(),
            ));
        }
    }

    code.ok_or_else(|| {
        BatchAppsError::Auth("Missing code parameter in response.".to_string())
    })
}
