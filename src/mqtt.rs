// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet, TlsConfiguration, Transport,
};
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tracing::instrument;
use url::Url;

const TLS_PORT: u16 = 8883;
const TCP_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CHANNEL_CAPACITY: usize = 10;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Broker URI {0} is not valid")]
    InvalidUri(String, #[source] url::ParseError),
    #[error("Broker URI scheme {0} is not supported, expected one of ssl, mqtts, tcp or mqtt")]
    UnsupportedScheme(String),
    #[error("Broker URI {0} does not name a host")]
    MissingHost(String),
    #[error("Failed to read the trust store located at {}", .0.display())]
    ReadTrustStore(PathBuf, #[source] std::io::Error),
    #[error("The trust store located at {} contains no certificates", .0.display())]
    EmptyTrustStore(PathBuf),
    #[error("No trusted root certificates could be loaded from the platform")]
    NoPlatformRoots,
    #[error("Failed to add a trusted certificate")]
    TrustAnchor(#[source] rustls::Error),
    #[error("Failed to configure TLS")]
    Tls(#[source] rustls::Error),
    #[error("Broker connection failed")]
    Connection(#[source] ConnectionError),
    #[error("Broker refused the connection: {0:?}")]
    Refused(ConnectReturnCode),
    #[error("Failed to request a disconnect")]
    Disconnect(#[source] ClientError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerTransport {
    Tls,
    Tcp,
}

/// A broker address in `scheme://host[:port]` form. `ssl` and `mqtts` select TLS, `tcp` and
/// `mqtt` select plain TCP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerUri {
    pub transport: BrokerTransport,
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerUri {
    type Err = MqttError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let parsed = Url::parse(uri).map_err(|err| MqttError::InvalidUri(uri.to_string(), err))?;
        let (transport, default_port) = match parsed.scheme() {
            "ssl" | "mqtts" => (BrokerTransport::Tls, TLS_PORT),
            "tcp" | "mqtt" => (BrokerTransport::Tcp, TCP_PORT),
            scheme => return Err(MqttError::UnsupportedScheme(scheme.to_string())),
        };
        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| MqttError::MissingHost(uri.to_string()))?;

        Ok(Self {
            transport,
            // IPv6 literals keep their brackets in the URL but not on the socket address.
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port: parsed.port().unwrap_or(default_port),
        })
    }
}

/// Identity and credentials presented in the CONNECT packet.
pub struct SessionConfig<'a> {
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    /// PEM bundle replacing the platform trust store for TLS brokers.
    pub trust_store: Option<&'a Path>,
}

impl Debug for SessionConfig<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("trust_store", &self.trust_store)
            .finish()
    }
}

impl SessionConfig<'_> {
    fn mqtt_options(&self, broker: &BrokerUri) -> Result<MqttOptions, MqttError> {
        let mut options = MqttOptions::new(self.client_id, broker.host.clone(), broker.port);
        options
            .set_keep_alive(KEEP_ALIVE)
            .set_clean_session(true)
            .set_credentials(self.username, self.password);

        if broker.transport == BrokerTransport::Tls {
            options.set_transport(tls_transport(self.trust_store)?);
        }

        Ok(options)
    }
}

fn tls_transport(trust_store: Option<&Path>) -> Result<Transport, MqttError> {
    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(MqttError::Tls)?
            .with_root_certificates(root_store(trust_store)?)
            .with_no_client_auth();

    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
        Arc::new(config),
    )))
}

fn root_store(trust_store: Option<&Path>) -> Result<RootCertStore, MqttError> {
    let mut roots = RootCertStore::empty();

    match trust_store {
        Some(path) => {
            let pem = std::fs::read(path)
                .map_err(|err| MqttError::ReadTrustStore(path.to_path_buf(), err))?;
            for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
                let cert =
                    cert.map_err(|err| MqttError::ReadTrustStore(path.to_path_buf(), err))?;
                roots.add(cert).map_err(MqttError::TrustAnchor)?;
            }
            if roots.is_empty() {
                return Err(MqttError::EmptyTrustStore(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), roots = roots.len(), "Loaded trust store");
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                tracing::warn!(?err, "Failed to load a platform certificate");
            }
            let (added, ignored) = roots.add_parsable_certificates(native.certs);
            if roots.is_empty() {
                return Err(MqttError::NoPlatformRoots);
            }
            tracing::debug!(added, ignored, "Loaded platform trust store");
        }
    }

    Ok(roots)
}

/// A connected MQTT client. The network stream is owned by the event loop and closes when the
/// session is dropped.
pub struct BrokerSession {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl BrokerSession {
    /// Sends CONNECT and waits for a successful CONNACK. Failures are returned without retrying.
    #[instrument(skip_all, fields(host = %broker.host, port = broker.port))]
    pub async fn connect(broker: &BrokerUri, config: &SessionConfig<'_>) -> Result<Self, MqttError> {
        let (client, mut event_loop) =
            AsyncClient::new(config.mqtt_options(broker)?, REQUEST_CHANNEL_CAPACITY);

        loop {
            let event = event_loop.poll().await.map_err(|err| match err {
                ConnectionError::ConnectionRefused(code) => MqttError::Refused(code),
                err => MqttError::Connection(err),
            })?;
            match event {
                Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                    tracing::debug!(session_present = ack.session_present, "Received CONNACK");
                    return Ok(Self { client, event_loop });
                }
                Event::Incoming(Packet::ConnAck(ack)) => return Err(MqttError::Refused(ack.code)),
                event => tracing::trace!(?event, "Waiting for CONNACK"),
            }
        }
    }

    /// Sends DISCONNECT and drives the event loop until it has been written.
    pub async fn disconnect(mut self) -> Result<(), MqttError> {
        self.client
            .disconnect()
            .await
            .map_err(MqttError::Disconnect)?;

        loop {
            match self.event_loop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(event) => tracing::trace!(?event, "Waiting for DISCONNECT to be sent"),
                Err(ConnectionError::RequestsDone) => return Ok(()),
                Err(err) => return Err(MqttError::Connection(err)),
            }
        }
    }
}
