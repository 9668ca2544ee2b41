//! Connection setup and the HTTP/1.1 exchange.
//!
//! A connection is either plain TCP or TLS over TCP, chosen by the URL
//! scheme. Each call opens its own connection, sends one request, buffers the
//! response body and closes the connection again.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper::ext::ReasonPhrase;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::RequestError;
use crate::http::{Headers, ParsedUrl, ResponseParts};

/// TLS client config with the Mozilla root set plus `extra_roots`. The
/// config without extra roots is built once per process.
fn tls_config(
    extra_roots: &[CertificateDer<'static>],
) -> Result<Arc<ClientConfig>, RequestError> {
    static DEFAULT: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    if !extra_roots.is_empty() {
        return build_tls_config(extra_roots);
    }
    if let Some(config) = DEFAULT.get() {
        return Ok(config.clone());
    }
    let config = build_tls_config(&[])?;
    Ok(DEFAULT.get_or_init(|| config).clone())
}

fn build_tls_config(
    extra_roots: &[CertificateDer<'static>],
) -> Result<Arc<ClientConfig>, RequestError> {
    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    for cert in extra_roots {
        roots.add(cert.clone()).map_err(RequestError::transport)?;
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(RequestError::transport)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// A plain or TLS byte stream to the target host.
pub(crate) enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl MaybeTlsStream {
    /// Connect to the URL's host and port, performing the TLS handshake for
    /// `https`.
    pub(crate) async fn connect(
        url: &ParsedUrl,
        extra_roots: &[CertificateDer<'static>],
    ) -> Result<Self, RequestError> {
        let tcp = TcpStream::connect((url.host.as_str(), url.port))
            .await
            .map_err(RequestError::transport)?;
        if let Err(err) = tcp.set_nodelay(true) {
            tracing::debug!(error = %err, "could not disable nagle");
        }
        if !url.is_tls() {
            return Ok(MaybeTlsStream::Plain(tcp));
        }
        let server_name = ServerName::try_from(url.host.clone())
            .map_err(|_| RequestError::InvalidUrl(format!("invalid TLS server name: {}", url.host)))?;
        let tls = TlsConnector::from(tls_config(extra_roots)?)
            .connect(server_name, tcp)
            .await
            .map_err(RequestError::transport)?;
        Ok(MaybeTlsStream::Tls(Box::new(tls)))
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Aborts the connection driver when dropped, so the socket is released on
/// every exit path including timeout.
struct ConnectionGuard(JoinHandle<()>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Send one request over a fresh connection and buffer the whole response.
pub(crate) async fn send(
    url: &ParsedUrl,
    request: http::Request<Full<Bytes>>,
    config: &crate::config::ClientConfig,
) -> Result<ResponseParts, RequestError> {
    let max_body_size = config.max_body_size;
    let stream = MaybeTlsStream::connect(url, &config.root_certificates).await?;
    tracing::trace!("connected");

    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(RequestError::transport)?;
    let _guard = ConnectionGuard(tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "connection closed with error");
        }
    }));

    let response = sender
        .send_request(request)
        .await
        .map_err(RequestError::transport)?;
    let (parts, mut body) = response.into_parts();
    tracing::debug!(status = parts.status.as_u16(), "headers received");

    let mut buf = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(RequestError::transport)?;
        if let Ok(chunk) = frame.into_data() {
            if let Some(limit) = max_body_size {
                if buf.len() + chunk.len() > limit {
                    return Err(RequestError::BodyTooLarge { limit });
                }
            }
            buf.extend_from_slice(&chunk);
        }
    }

    let reason = parts
        .extensions
        .get::<ReasonPhrase>()
        .map(|r| String::from_utf8_lossy(r.as_bytes()).into_owned());
    let mut headers = Headers::new();
    for (name, value) in &parts.headers {
        headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }

    Ok(ResponseParts {
        status: parts.status.as_u16(),
        reason,
        headers,
        body: buf,
    })
}
