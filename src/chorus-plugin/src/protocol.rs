//! Wire types for the plugin line protocol.
//!
//! The host writes one [`PluginRequest`] per line to the plugin's stdin and
//! reads lines from its stdout. While a request is outstanding the plugin
//! may emit any number of [`HostCallRequest`]s; each is answered with a
//! [`HostCallReply`] before the plugin sends its final [`PluginResponse`].

use chorus_core::config::HostCapability;
use chorus_core::lyric::LyricPayload;
use chorus_core::models::{MediaStreamDescriptor, SearchKind, Track};
use chorus_core::provider::{Capability, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    pub id: u64,
    pub method: PluginMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponse {
    pub id: u64,
    pub result: PluginResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum PluginMethod {
    Initialize,
    Search {
        query: String,
        page: u32,
        kind: SearchKind,
    },
    GetMediaSource {
        track: Track,
    },
    GetLyric {
        track: Track,
    },
    ImportMusicSheet {
        url: String,
    },
    Shutdown,
}

impl PluginMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PluginMethod::Initialize => "Initialize",
            PluginMethod::Search { .. } => "Search",
            PluginMethod::GetMediaSource { .. } => "GetMediaSource",
            PluginMethod::GetLyric { .. } => "GetLyric",
            PluginMethod::ImportMusicSheet { .. } => "ImportMusicSheet",
            PluginMethod::Shutdown => "Shutdown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum PluginResult {
    Initialized(PluginInfo),
    /// Raw search response: a bare list or an envelope with `data`.
    Tracks {
        #[serde(default)]
        result: Value,
    },
    MediaSource {
        #[serde(default)]
        source: Option<MediaStreamDescriptor>,
    },
    Lyric {
        #[serde(default)]
        lyric: Option<LyricPayload>,
    },
    /// Raw import response; `null` when the URL is not the plugin's.
    Sheet {
        #[serde(default)]
        result: Option<Value>,
    },
    ShutdownAck,
    Error(PluginError),
}

/// Returned by the plugin in answer to `Initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub protocol_version: u32,
    /// Operations the plugin implements.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Host services the plugin wants; granted only if also allowlisted.
    #[serde(default)]
    pub host_capabilities: Vec<HostCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginError {
    pub kind: PluginErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginErrorKind {
    Network,
    NotSupported,
    ProtocolMismatch,
    Internal,
}

impl From<PluginError> for ProviderError {
    fn from(err: PluginError) -> Self {
        match err.kind {
            PluginErrorKind::Network => Self::NetworkError {
                message: err.message,
            },
            PluginErrorKind::NotSupported => Self::NotSupported {
                operation: err.message,
            },
            PluginErrorKind::ProtocolMismatch => Self::ProtocolError {
                message: err.message,
            },
            PluginErrorKind::Internal => Self::PluginError {
                message: err.message,
            },
        }
    }
}

/// A line from plugin stdout: either a host call or the final response.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PluginMessage {
    HostCall(HostCallRequest),
    Response(PluginResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCallRequest {
    pub host_call: u64,
    /// Decoded into [`HostCall`] by the host so a malformed call is answered
    /// rather than treated as a broken channel.
    pub call: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCallReply {
    pub host_call: u64,
    pub reply: HostReply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum HostCall {
    Http {
        #[serde(default = "default_method")]
        method: String,
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        query: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<String>,
    },
    /// Text (or `attr` value) of every element matching a CSS selector,
    /// in document order.
    Html {
        html: String,
        selector: String,
        #[serde(default)]
        attr: Option<String>,
    },
    Crypto {
        algorithm: DigestAlgorithm,
        data: String,
        #[serde(default)]
        key: Option<String>,
    },
    /// AES-128 with PKCS#7 padding. `key` and `iv` are UTF-8 text.
    /// Encryption takes UTF-8 plaintext and returns ciphertext in `output`
    /// encoding; decryption takes ciphertext in that encoding.
    Cipher {
        mode: CipherMode,
        op: CipherOp,
        data: String,
        key: String,
        #[serde(default)]
        iv: Option<String>,
        #[serde(default)]
        output: BinaryEncoding,
    },
    /// Arbitrary-precision unsigned arithmetic on numbers written in `radix`.
    BigInt {
        op: BigIntOp,
        operands: Vec<String>,
        #[serde(default = "default_radix")]
        radix: u32,
    },
    Now,
    FormatDate { unix_millis: i64, format: String },
    Encoding { op: EncodingOp, data: String },
}

impl HostCall {
    pub fn capability(&self) -> HostCapability {
        match self {
            HostCall::Http { .. } => HostCapability::Http,
            HostCall::Html { .. } => HostCapability::Html,
            HostCall::Crypto { .. } => HostCapability::Crypto,
            HostCall::Cipher { .. } => HostCapability::Cipher,
            HostCall::BigInt { .. } => HostCapability::BigInt,
            HostCall::Now | HostCall::FormatDate { .. } => HostCapability::Date,
            HostCall::Encoding { .. } => HostCapability::Encoding,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_radix() -> u32 {
    16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
    Sha512,
    HmacSha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherMode {
    Cbc,
    Ecb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherOp {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryEncoding {
    #[default]
    Base64,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BigIntOp {
    Add,
    Multiply,
    /// `operands` are base, exponent and modulus.
    ModPow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingOp {
    Base64Encode,
    Base64Decode,
    HexEncode,
    HexDecode,
    UrlEncode,
    UrlDecode,
}

/// Tagged by `kind`; `status` is the HTTP status of an `Http` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum HostReply {
    Http {
        status: u16,
        headers: BTreeMap<String, String>,
        body: String,
    },
    Texts {
        texts: Vec<String>,
    },
    Text {
        text: String,
    },
    Now {
        rfc3339: String,
        unix_millis: i64,
    },
    /// The capability is not granted to this plugin.
    Denied {
        message: String,
    },
    Failed {
        message: String,
    },
}
