// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use reqwest::{Client, Url, header::CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use tap::TapFallible;
use thiserror::Error;
use tracing::instrument;

pub mod password;

pub use password::PasswordGrant;

static FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token endpoint {0} is not a valid URL")]
    InvalidEndpoint(String, #[source] url::ParseError),
    #[error("Failed to construct the HTTP client")]
    ClientConstruction(#[source] reqwest::Error),
    #[error("Token request failed")]
    Request(#[source] reqwest::Error),
    #[error("Failed to read the token response body")]
    ReadBody(#[source] reqwest::Error),
}

/// The verbatim body returned by the token endpoint. It is never parsed; brokers that accept
/// OAuth credentials receive the whole response as the password.
#[derive(Debug)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(value: String) -> Self {
        Self(SecretString::from(value))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

#[derive(Clone, Debug)]
pub struct TokenEndpointConfig {
    pub uri: String,
    /// Accept any certificate and hostname presented by the token endpoint.
    pub insecure_skip_verify: bool,
}

impl TokenEndpointConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            insecure_skip_verify: false,
        }
    }

    pub fn with_insecure_skip_verify(mut self, insecure_skip_verify: bool) -> Self {
        self.insecure_skip_verify = insecure_skip_verify;
        self
    }
}

#[derive(Debug)]
pub struct TokenFetcher {
    client: Client,
    endpoint: Url,
}

impl TokenFetcher {
    pub fn new(config: &TokenEndpointConfig) -> Result<Self, TokenError> {
        let endpoint = Url::parse(&config.uri)
            .map_err(|err| TokenError::InvalidEndpoint(config.uri.clone(), err))?;
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(TokenError::ClientConstruction)?;

        Ok(Self { client, endpoint })
    }

    /// Performs the password grant and returns the response body as is. The status code is not
    /// inspected, so an error body from the provider becomes the token.
    #[instrument(skip_all, fields(endpoint = %self.endpoint, client_id = %grant.client_id))]
    pub async fn request(&self, grant: &PasswordGrant) -> Result<AccessToken, TokenError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(grant.form_body())
            .send()
            .await
            .map_err(TokenError::Request)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "Token endpoint returned a non-success status");
        }

        let body = response.text().await.map_err(TokenError::ReadBody)?;
        tracing::info!(length = body.len(), "Retrieved access token");

        Ok(AccessToken::new(body))
    }
}

/// Fetches a token, logging and discarding any failure. Callers continue with no token.
pub async fn fetch_access_token(
    config: &TokenEndpointConfig,
    grant: &PasswordGrant,
) -> Option<AccessToken> {
    let fetcher = TokenFetcher::new(config)
        .tap_err(|err| tracing::error!(?err, "Failed to prepare the token request"))
        .ok()?;

    fetcher
        .request(grant)
        .await
        .tap_err(|err| tracing::error!(?err, "Failed to retrieve access token"))
        .ok()
}
