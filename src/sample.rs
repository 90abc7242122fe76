// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write;

use tap::TapFallible;
use thiserror::Error;

use crate::{
    args::SampleArgs,
    mqtt::{BrokerSession, BrokerUri, MqttError, SessionConfig},
    settings::Settings,
    token::{PasswordGrant, TokenEndpointConfig, fetch_access_token},
};

pub static MQTT_CLIENT_ID: &str = "OAuthMqttSample";

/// Brokers that authenticate with OAuth expect this username and the token as the password.
pub static ACCESS_TOKEN_USERNAME: &str = "IMA_OAUTH_ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Failed to write status output")]
    Output(#[from] std::io::Error),
    #[error("MQTT session failed")]
    Mqtt(#[from] MqttError),
}

/// Fetches a token and uses it for a single connect/disconnect against the broker, writing
/// progress lines to `out`.
pub async fn run(
    args: SampleArgs,
    settings: &Settings,
    out: &mut impl Write,
) -> Result<(), SampleError> {
    let insecure_skip_verify = settings.insecure_skip_verify.unwrap_or(true);
    if insecure_skip_verify {
        tracing::warn!(
            endpoint = %args.oauth_uri,
            "TLS certificate and hostname verification is DISABLED for the token endpoint"
        );
    }

    let endpoint =
        TokenEndpointConfig::new(&args.oauth_uri).with_insecure_skip_verify(insecure_skip_verify);
    let grant = PasswordGrant {
        client_id: args.client_id,
        client_secret: args.client_secret,
        username: args.username,
        password: args.password,
    };
    let token = fetch_access_token(&endpoint, &grant).await;
    match &token {
        Some(token) => writeln!(out, "Retrieved access token ({} bytes)", token.expose().len())?,
        None => tracing::warn!("Continuing without an access token"),
    }

    let broker = args.broker.parse::<BrokerUri>()?;
    let session_config = SessionConfig {
        client_id: MQTT_CLIENT_ID,
        username: ACCESS_TOKEN_USERNAME,
        password: token.as_ref().map(|token| token.expose()).unwrap_or_default(),
        trust_store: settings.trust_store.as_deref(),
    };

    writeln!(out, "Connecting to broker: {}", args.broker)?;
    let session = BrokerSession::connect(&broker, &session_config)
        .await
        .tap_err(|err| tracing::error!(?err, broker = %args.broker, "Failed to connect"))?;
    writeln!(out, "Connected")?;

    session
        .disconnect()
        .await
        .tap_err(|err| tracing::error!(?err, "Failed to disconnect"))?;
    writeln!(out, "Disconnected")?;

    Ok(())
}
