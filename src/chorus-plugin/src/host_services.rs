//! Services a plugin may call back into while it handles a request.
//!
//! Only calls whose [`HostCapability`] is both allowlisted in config and
//! requested by the plugin at handshake are executed; anything else is
//! answered with [`HostReply::Denied`].

use crate::protocol::{
    BigIntOp, BinaryEncoding, CipherMode, CipherOp, DigestAlgorithm, EncodingOp, HostCall,
    HostReply,
};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use base64::Engine as _;
use chorus_core::config::HostCapability;
use chorus_core::redact::redact_secrets;
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256, Sha512};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

/// Shared by every plugin host in the process.
#[derive(Debug, Clone)]
pub struct HostServices {
    allowed: HashSet<HostCapability>,
    client: reqwest::Client,
}

impl HostServices {
    pub fn new(allowed: impl IntoIterator<Item = HostCapability>, client: reqwest::Client) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            client,
        }
    }

    /// Capabilities actually granted to a plugin that requested `requested`.
    pub fn grant(&self, requested: &[HostCapability]) -> HashSet<HostCapability> {
        requested
            .iter()
            .copied()
            .filter(|c| self.allowed.contains(c))
            .collect()
    }

    pub async fn handle(&self, call: HostCall, granted: &HashSet<HostCapability>) -> HostReply {
        let capability = call.capability();
        if !granted.contains(&capability) {
            return HostReply::Denied {
                message: format!("host capability {capability:?} is not granted"),
            };
        }

        let outcome = match call {
            HostCall::Http {
                method,
                url,
                headers,
                query,
                body,
            } => self.http(&method, &url, headers, query, body).await,
            HostCall::Html {
                html,
                selector,
                attr,
            } => select_texts(&html, &selector, attr.as_deref())
                .map(|texts| HostReply::Texts { texts }),
            HostCall::Crypto {
                algorithm,
                data,
                key,
            } => digest(algorithm, &data, key.as_deref()).map(|text| HostReply::Text { text }),
            HostCall::Cipher {
                mode,
                op,
                data,
                key,
                iv,
                output,
            } => aes128(mode, op, &data, &key, iv.as_deref(), output)
                .map(|text| HostReply::Text { text }),
            HostCall::BigInt {
                op,
                operands,
                radix,
            } => big_int(op, &operands, radix).map(|text| HostReply::Text { text }),
            HostCall::Now => {
                let now = chrono::Utc::now();
                Ok(HostReply::Now {
                    rfc3339: now.to_rfc3339(),
                    unix_millis: now.timestamp_millis(),
                })
            }
            HostCall::FormatDate {
                unix_millis,
                format,
            } => format_date(unix_millis, &format).map(|text| HostReply::Text { text }),
            HostCall::Encoding { op, data } => {
                encode(op, &data).map(|text| HostReply::Text { text })
            }
        };

        outcome.unwrap_or_else(|message| HostReply::Failed { message })
    }

    async fn http(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        query: BTreeMap<String, String>,
        body: Option<String>,
    ) -> Result<HostReply, String> {
        let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid url: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("scheme {} is not allowed", parsed.scheme()));
        }
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| format!("invalid method {method}"))?;

        let mut request = self.client.request(method, parsed);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        tracing::debug!(url = %redact_secrets(url), "Plugin HTTP request");
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(HostReply::Http {
            status,
            headers,
            body,
        })
    }
}

/// Trimmed text, or the `attr` value, of every element matching `selector`.
pub fn select_texts(html: &str, selector: &str, attr: Option<&str>) -> Result<Vec<String>, String> {
    let selector =
        Selector::parse(selector).map_err(|e| format!("invalid selector {selector:?}: {e}"))?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .filter_map(|element| match attr {
            Some(name) => element.value().attr(name).map(str::to_string),
            None => Some(element.text().collect::<String>().trim().to_string()),
        })
        .collect())
}

/// Text of the first non-empty `<title>` element, if any.
pub fn page_title(html: &str) -> Option<String> {
    select_texts(html, "title", None)
        .ok()?
        .into_iter()
        .find(|t| !t.is_empty())
}

fn digest(algorithm: DigestAlgorithm, data: &str, key: Option<&str>) -> Result<String, String> {
    match algorithm {
        DigestAlgorithm::Md5 => Ok(format!("{:x}", md5::compute(data.as_bytes()))),
        DigestAlgorithm::Sha256 => Ok(hex::encode(Sha256::digest(data.as_bytes()))),
        DigestAlgorithm::Sha512 => Ok(hex::encode(Sha512::digest(data.as_bytes()))),
        DigestAlgorithm::HmacSha256 => {
            let key = key.ok_or("hmac_sha256 requires a key")?;
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes())
                .map_err(|e| e.to_string())?;
            mac.update(data.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
    }
}

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;
type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;

fn aes128(
    mode: CipherMode,
    op: CipherOp,
    data: &str,
    key: &str,
    iv: Option<&str>,
    output: BinaryEncoding,
) -> Result<String, String> {
    let key = key.as_bytes();
    let iv = match (mode, iv) {
        (CipherMode::Cbc, Some(iv)) => iv.as_bytes(),
        (CipherMode::Cbc, None) => return Err("cbc mode requires an iv".to_string()),
        (CipherMode::Ecb, _) => &[],
    };
    match op {
        CipherOp::Encrypt => {
            let plain = data.as_bytes();
            let sealed = match mode {
                CipherMode::Cbc => Aes128CbcEnc::new_from_slices(key, iv)
                    .map_err(|e| e.to_string())?
                    .encrypt_padded_vec_mut::<Pkcs7>(plain),
                CipherMode::Ecb => Aes128EcbEnc::new_from_slice(key)
                    .map_err(|e| e.to_string())?
                    .encrypt_padded_vec_mut::<Pkcs7>(plain),
            };
            Ok(encode_binary(output, &sealed))
        }
        CipherOp::Decrypt => {
            let sealed = decode_binary(output, data)?;
            let plain = match mode {
                CipherMode::Cbc => Aes128CbcDec::new_from_slices(key, iv)
                    .map_err(|e| e.to_string())?
                    .decrypt_padded_vec_mut::<Pkcs7>(&sealed),
                CipherMode::Ecb => Aes128EcbDec::new_from_slice(key)
                    .map_err(|e| e.to_string())?
                    .decrypt_padded_vec_mut::<Pkcs7>(&sealed),
            }
            .map_err(|e| e.to_string())?;
            String::from_utf8(plain).map_err(|e| e.to_string())
        }
    }
}

fn encode_binary(encoding: BinaryEncoding, bytes: &[u8]) -> String {
    match encoding {
        BinaryEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
        BinaryEncoding::Hex => hex::encode(bytes),
    }
}

fn decode_binary(encoding: BinaryEncoding, text: &str) -> Result<Vec<u8>, String> {
    match encoding {
        BinaryEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map_err(|e| e.to_string()),
        BinaryEncoding::Hex => hex::decode(text).map_err(|e| e.to_string()),
    }
}

fn big_int(op: BigIntOp, operands: &[String], radix: u32) -> Result<String, String> {
    if !(2..=36).contains(&radix) {
        return Err(format!("radix {radix} is outside 2..=36"));
    }
    let values = operands
        .iter()
        .map(|text| {
            BigUint::parse_bytes(text.as_bytes(), radix)
                .ok_or_else(|| format!("{text:?} is not a base-{radix} number"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let result = match op {
        BigIntOp::Add => values.into_iter().sum::<BigUint>(),
        BigIntOp::Multiply => values.into_iter().product::<BigUint>(),
        BigIntOp::ModPow => {
            let [base, exponent, modulus] = values.as_slice() else {
                return Err("mod_pow takes base, exponent and modulus".to_string());
            };
            if modulus.bits() == 0 {
                return Err("modulus must be non-zero".to_string());
            }
            base.modpow(exponent, modulus)
        }
    };
    Ok(result.to_str_radix(radix))
}

fn format_date(unix_millis: i64, format: &str) -> Result<String, String> {
    let at = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(unix_millis)
        .ok_or_else(|| format!("timestamp {unix_millis} out of range"))?;
    let mut out = String::new();
    write!(out, "{}", at.format(format)).map_err(|_| format!("invalid format {format:?}"))?;
    Ok(out)
}

fn encode(op: EncodingOp, data: &str) -> Result<String, String> {
    let engine = base64::engine::general_purpose::STANDARD;
    match op {
        EncodingOp::Base64Encode => Ok(engine.encode(data.as_bytes())),
        EncodingOp::Base64Decode => engine
            .decode(data.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string())),
        EncodingOp::HexEncode => Ok(hex::encode(data.as_bytes())),
        EncodingOp::HexDecode => hex::decode(data)
            .map_err(|e| e.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string())),
        EncodingOp::UrlEncode => Ok(urlencoding::encode(data).into_owned()),
        EncodingOp::UrlDecode => urlencoding::decode(data)
            .map(|s| s.into_owned())
            .map_err(|e| e.to_string()),
    }
}
