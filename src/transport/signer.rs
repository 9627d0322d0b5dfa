//! Canonical request signing (HMAC-SHA1 over the canonicalized request)

use crate::types::Secret;
use crate::{Result, ShipError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, CONTENT_TYPE, DATE};
use reqwest::Method;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header prefixes that take part in the canonicalized headers
const SIGNED_HEADER_PREFIXES: [&str; 2] = ["x-log-", "x-acs-"];

const CONTENT_MD5: &str = "content-md5";

/// Build the exact string that gets signed.
///
/// Lines, joined by `\n`: method, `Content-MD5`, `Content-Type`, `Date`, every
/// `x-log-*`/`x-acs-*` header as `name:value` sorted, then the escaped path.
pub fn string_to_sign(method: &Method, path: &str, headers: &HeaderMap) -> String {
    let mut lines = vec![
        method.as_str().to_string(),
        header_text(headers, CONTENT_MD5),
        header_text(headers, CONTENT_TYPE.as_str()),
        header_text(headers, DATE.as_str()),
    ];

    let mut canonical: Vec<String> = headers
        .keys()
        .filter(|name| {
            SIGNED_HEADER_PREFIXES
                .iter()
                .any(|prefix| name.as_str().starts_with(prefix))
        })
        .map(|name| {
            let values: Vec<String> = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            format!("{}:{}", name.as_str(), values.join(",").trim())
        })
        .collect();
    canonical.sort();
    lines.extend(canonical);

    lines.push(path.to_string());
    lines.join("\n")
}

/// Base64 HMAC-SHA1 of the canonical string, keyed by `secret`
pub fn sign(secret: &Secret, method: &Method, path: &str, headers: &HeaderMap) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.expose())
        .map_err(|e| ShipError::Signing(e.to_string()))?;
    mac.update(string_to_sign(method, path, headers).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn header_text(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}
