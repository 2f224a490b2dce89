//! Media stream resolution and the hotlink-bypassing stream proxy.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use chorus_core::config::ProxyConfig;
use chorus_core::models::{MediaStreamDescriptor, Track};
use chorus_core::redact::redact_secrets;
use chorus_core::registry::ProviderRegistry;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::error::ApiError;

/// Path of the proxy endpoint as seen by clients.
pub const PROXY_PATH: &str = "/api/proxy";

/// What `/api/play` hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayResponse {
    pub url: String,
}

pub struct MediaProxy {
    registry: Arc<ProviderRegistry>,
    client: reqwest::Client,
    always_proxy: Vec<String>,
    user_agent: String,
    referer: String,
    allow_private_upstreams: bool,
}

impl MediaProxy {
    pub fn new(registry: Arc<ProviderRegistry>, config: &ProxyConfig, client: reqwest::Client) -> Self {
        Self {
            registry,
            client,
            always_proxy: config.always_proxy.clone(),
            user_agent: config.user_agent.clone(),
            referer: config.referer.clone(),
            allow_private_upstreams: config.allow_private_upstreams,
        }
    }

    /// Resolve a playable URL for `track`. Streams that need headers, or that
    /// come from a provider known to check the origin, are routed through the
    /// proxy so the raw upstream URL never reaches the client.
    pub async fn play(&self, provider_id: &str, track: &Track) -> Result<PlayResponse, ApiError> {
        let provider = self.registry.get(provider_id)?;
        let source = provider
            .get_media_source(track)
            .await?
            .filter(|s| !s.url.is_empty())
            .ok_or_else(|| ApiError::Upstream {
                message: "No media URL returned by plugin".to_string(),
            })?;
        Ok(self.play_response(provider_id, source))
    }

    pub fn play_response(&self, provider_id: &str, source: MediaStreamDescriptor) -> PlayResponse {
        if source.requires_proxy() || self.always_proxy.iter().any(|id| id == provider_id) {
            tracing::debug!(provider_id, "Routing media through proxy");
            PlayResponse {
                url: proxy_reference(&source.url),
            }
        } else {
            PlayResponse { url: source.url }
        }
    }

    /// Fetch `url` with spoofed browser headers and stream the body back.
    /// Upstream error detail is logged, never returned.
    pub async fn stream(&self, url: &str) -> Result<Response, ApiError> {
        let parsed = url::Url::parse(url).map_err(|_| ApiError::BadRequest("Invalid URL".into()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::BadRequest("Invalid URL".into()));
        }
        if !self.allow_private_upstreams {
            refuse_private_host(&parsed).await?;
        }

        let upstream = self
            .client
            .get(parsed.as_str())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::REFERER, &self.referer)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|error| {
                tracing::warn!(url = %redact_secrets(url), %error, "Proxy upstream failed");
                ApiError::Internal("Proxy failed".to_string())
            })?;

        let mut response = Response::builder().status(StatusCode::OK);
        for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH] {
            if let Some(value) = upstream.headers().get(name.as_str()) {
                if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                    response = response.header(name, value);
                }
            }
        }
        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ApiError::Internal(e.to_string()))
    }
}

/// Reject URLs whose host is, or resolves to, a loopback, private or
/// link-local address.
async fn refuse_private_host(url: &url::Url) -> Result<(), ApiError> {
    let refused = || ApiError::BadRequest("Upstream address not allowed".into());
    let port = url.port_or_known_default().unwrap_or(80);
    match url.host() {
        Some(url::Host::Ipv4(ip)) if is_private_v4(ip) => Err(refused()),
        Some(url::Host::Ipv6(ip)) if is_private_v6(ip) => Err(refused()),
        Some(url::Host::Domain(domain)) => {
            let addrs = tokio::net::lookup_host((domain, port)).await.map_err(|error| {
                tracing::warn!(host = domain, %error, "Proxy upstream did not resolve");
                ApiError::Internal("Proxy failed".to_string())
            })?;
            for addr in addrs {
                if is_private(addr.ip()) {
                    tracing::warn!(host = domain, ip = %addr.ip(), "Refusing private proxy upstream");
                    return Err(refused());
                }
            }
            Ok(())
        }
        Some(_) => Ok(()),
        None => Err(ApiError::BadRequest("Invalid URL".into())),
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => is_private_v4(ip),
        IpAddr::V6(ip) => is_private_v6(ip),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || ip.to_ipv4_mapped().is_some_and(is_private_v4)
}

/// Same-origin reference to the proxy for `upstream`.
pub fn proxy_reference(upstream: &str) -> String {
    format!("{PROXY_PATH}?url={}", urlencoding::encode(upstream))
}
