// Token requests against the AAD token endpoint

use reqwest::Client;

use super::types::{Token, TokenErrorResponse, TokenResponse};
use crate::error::{BatchAppsError, Result};

/// Exchange an authorization code for a token
pub async fn exchange_code(
    client: &Client,
    token_url: &str,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
    resource: &str,
) -> Result<Token> {
    tracing::info!("Fetching token for authorization code...");

    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client_id),
        ("resource", resource),
    ];
    request_token(client, token_url, &form).await
}

/// Request a token with the client credentials grant
pub async fn client_credentials(
    client: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    resource: &str,
) -> Result<Token> {
    tracing::info!("Fetching unattended token for client {}...", client_id);

    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("resource", resource),
    ];
    request_token(client, token_url, &form).await
}

/// Refresh a token using its refresh token
pub async fn refresh_token(
    client: &Client,
    token_url: &str,
    client_id: &str,
    refresh_token: &str,
    resource: &str,
) -> Result<Token> {
    tracing::info!("Refreshing access token...");

    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
        ("resource", resource),
    ];
    let token = request_token(client, token_url, &form).await?;

    tracing::info!("Token refreshed, expires in {}s", token.expires_in());
    Ok(token)
}

async fn request_token(client: &Client, token_url: &str, form: &[(&str, &str)]) -> Result<Token> {
    tracing::debug!("Fetching token with token_uri: {}", token_url);

    let response = client
        .post(token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| BatchAppsError::Auth(format!("Failed to send token request: {}", e)))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        tracing::error!("Token request failed: status={}, body={}", status, body);

        let parsed = serde_json::from_str::<TokenErrorResponse>(&body).ok();
        let code = parsed.as_ref().and_then(|e| e.error.clone());
        let description = parsed
            .and_then(|e| e.error_description.or(e.error))
            .unwrap_or_else(|| format!("Token request failed with status {}", status));

        if code.as_deref() == Some("invalid_grant") {
            return Err(BatchAppsError::SessionExpired(description));
        }
        return Err(BatchAppsError::Auth(description));
    }

    let data: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        BatchAppsError::Auth(format!("Failed to parse token response: {}", e))
    })?;

    let token = data.into_token();
    if !token.is_valid() {
        return Err(BatchAppsError::Auth("Invalid token.".to_string()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_refresh_token_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/common/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "old-refresh".into()),
                Matcher::UrlEncoded("client_id".into(), "abc".into()),
                Matcher::UrlEncoded("resource".into(), "https://res/".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"token_type":"Bearer","access_token":"new","refresh_token":"r2","expires_in":"3600"}"#,
            )
            .create_async()
            .await;

        let url = format!("{}/common/oauth2/token", server.url());
        let token = refresh_token(&Client::new(), &url, "abc", "old-refresh", "https://res/")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_client_credentials_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tenant/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","access_token":"svc","expires_in":3600}"#)
            .create_async()
            .await;

        let url = format!("{}/tenant/oauth2/token", server.url());
        let token = client_credentials(&Client::new(), &url, "client", "secret", "https://res/")
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(token.is_unattended());
    }

    #[tokio::test]
    async fn test_token_error_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_client","error_description":"Bad secret"}"#)
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let err = client_credentials(&Client::new(), &url, "c", "s", "r")
            .await
            .unwrap_err();
        assert!(matches!(err, BatchAppsError::Auth(ref m) if m == "Bad secret"));
    }

    #[tokio::test]
    async fn test_invalid_grant_expires_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Refresh token expired"}"#)
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let err = refresh_token(&Client::new(), &url, "c", "r", "res")
            .await
            .unwrap_err();
        assert!(matches!(err, BatchAppsError::SessionExpired(_)));
        assert!(err.needs_login());
    }
}
