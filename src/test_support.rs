// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{net::SocketAddr, sync::Arc};

use rustls::{
    ServerConfig,
    pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_rustls::TlsAcceptor;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const DISCONNECT: u8 = 0xE0;

#[derive(Debug)]
pub struct ObservedConnect {
    pub client_id: String,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct Observed {
    pub connect: ObservedConnect,
    pub disconnected: bool,
}

/// Accepts a single MQTT 3.1.1 client over plain TCP, answers CONNECT with the given CONNACK
/// return code and records what the client sent.
pub struct StubBroker {
    address: SocketAddr,
    handle: JoinHandle<Observed>,
}

impl StubBroker {
    pub async fn start(return_code: u8) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (header, body) = read_packet(&mut stream).await.unwrap();
            assert_eq!(header, CONNECT);
            let connect = parse_connect(&body);

            stream
                .write_all(&[CONNACK, 0x02, 0x00, return_code])
                .await
                .unwrap();

            let disconnected = match read_packet(&mut stream).await {
                Ok((header, _)) => header == DISCONNECT,
                Err(_) => false,
            };

            Observed {
                connect,
                disconnected,
            }
        });

        Self { address, handle }
    }

    pub fn uri(&self) -> String {
        format!("tcp://{}", self.address)
    }

    pub async fn finish(self) -> Observed {
        self.handle.await.unwrap()
    }
}

/// A local port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Serves `body` over HTTPS with a self-signed certificate issued for a name other than the
/// address clients connect to. Returns the token endpoint URI.
pub async fn start_self_signed_token_endpoint(body: &'static str) -> String {
    let certified = rcgen::generate_simple_self_signed(vec!["wrong.example".to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));
    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![certified.cert.der().clone()], key)
    .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // Clients that verify the certificate abort the handshake.
                let Ok(mut stream) = acceptor.accept(stream).await else {
                    return;
                };
                if read_http_request(&mut stream).await.is_err() {
                    return;
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("https://{address}/token")
}

async fn read_http_request<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        request.extend_from_slice(&chunk[..read]);

        let Some(header_end) = request.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= header_end + 4 + content_length {
            return Ok(());
        }
    }
}

async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;

    let mut length = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        length |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; length];
    stream.read_exact(&mut body).await?;
    Ok((header, body))
}

fn parse_connect(body: &[u8]) -> ObservedConnect {
    let mut position = 0;
    let _protocol = read_field(body, &mut position);
    let _level = body[position];
    let flags = body[position + 1];
    // Skip the level, flags and keep alive.
    position += 4;

    let client_id = String::from_utf8(read_field(body, &mut position)).unwrap();
    let username = (flags & 0x80 != 0)
        .then(|| String::from_utf8(read_field(body, &mut position)).unwrap());
    let password = (flags & 0x40 != 0).then(|| read_field(body, &mut position));

    ObservedConnect {
        client_id,
        clean_session: flags & 0x02 != 0,
        username,
        password,
    }
}

fn read_field(body: &[u8], position: &mut usize) -> Vec<u8> {
    let length = usize::from(u16::from_be_bytes([body[*position], body[*position + 1]]));
    let start = *position + 2;
    *position = start + length;
    body[start..start + length].to_vec()
}
