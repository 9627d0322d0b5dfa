//! Signed HTTP transport for log batches

use super::{codec, signer, Transport};
use crate::types::{Message, Secret};
use crate::{DeliveryError, Result, ShipError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use md5::{Digest, Md5};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST,
};
use reqwest::{Method, Response, Url};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";
const API_VERSION: &str = "0.6.0";
const COMPRESS_TYPE: &str = "lz4";
const SIGNATURE_METHOD: &str = "hmac-sha1";

/// Response header carrying the server-side correlation id
pub const REQUEST_ID_HEADER: &str = "x-log-requestid";

const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");
const X_LOG_APIVERSION: HeaderName = HeaderName::from_static("x-log-apiversion");
const X_LOG_BODYRAWSIZE: HeaderName = HeaderName::from_static("x-log-bodyrawsize");
const X_LOG_COMPRESSTYPE: HeaderName = HeaderName::from_static("x-log-compresstype");
const X_LOG_SIGNATUREMETHOD: HeaderName = HeaderName::from_static("x-log-signaturemethod");

/// Where and as whom batches are delivered. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Full PutLogs URL (`.../logstores/{store}/shards/lb`)
    pub url: Url,
    /// Access key id
    pub access_key: String,
    /// Access key secret
    pub secret: Secret,
    /// Log group topic
    pub topic: String,
    /// Log group source
    pub source: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// A fully built, signed request that has not been sent yet
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// Target URL
    pub url: Url,
    /// All request headers, `Authorization` included
    pub headers: HeaderMap,
    /// Compressed body
    pub body: Bytes,
}

/// Turns batches into signed, compressed PutLogs requests
#[derive(Debug, Clone)]
pub struct TransportClient {
    http: reqwest::Client,
    connection: Connection,
}

impl TransportClient {
    /// Create a client with a default HTTP transport
    pub fn new(connection: Connection) -> Self {
        Self::with_http_client(reqwest::Client::new(), connection)
    }

    /// Create a client on top of an existing HTTP transport
    pub fn with_http_client(http: reqwest::Client, connection: Connection) -> Self {
        Self { http, connection }
    }

    /// Connection this client delivers to
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Serialize a batch to the binary log-group format
    pub fn encode(&self, batch: &[Message]) -> Result<Vec<u8>> {
        codec::encode(&self.connection.topic, &self.connection.source, batch)
    }

    /// LZ4 block-compress encoded bytes
    pub fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        codec::compress(raw)
    }

    /// Build and sign the PutLogs request for a compressed body.
    ///
    /// `date` is the RFC 1123 GMT date header value; passing it in keeps this
    /// step deterministic.
    pub fn build_request(&self, raw_len: usize, compressed: Vec<u8>, date: &str) -> Result<SignedRequest> {
        let url = self.connection.url.clone();
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_PROTOBUF));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(compressed.len()));
        headers.insert(CONTENT_MD5, header_value(&hex::encode_upper(Md5::digest(&compressed)))?);
        headers.insert(DATE, header_value(date)?);
        headers.insert(HOST, header_value(&host_header(&url))?);
        headers.insert(X_LOG_APIVERSION, HeaderValue::from_static(API_VERSION));
        headers.insert(X_LOG_BODYRAWSIZE, HeaderValue::from(raw_len));
        headers.insert(X_LOG_COMPRESSTYPE, HeaderValue::from_static(COMPRESS_TYPE));
        headers.insert(X_LOG_SIGNATUREMETHOD, HeaderValue::from_static(SIGNATURE_METHOD));

        let signature = signer::sign(&self.connection.secret, &Method::POST, url.path(), &headers)?;
        let authorization = format!("LOG {}:{}", self.connection.access_key, signature);
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(SignedRequest {
            url,
            headers,
            body: Bytes::from(compressed),
        })
    }

    /// Send the request and read the response, both bounded by the connection timeout
    pub async fn fire(&self, request: SignedRequest) -> Result<()> {
        let limit = self.connection.timeout;
        let exchange = async {
            let response = self
                .http
                .post(request.url)
                .headers(request.headers)
                .body(request.body)
                .send()
                .await?;
            validate_response(response).await
        };

        timeout(limit, exchange)
            .await
            .map_err(|_| ShipError::Timeout(limit))?
    }
}

#[async_trait]
impl Transport for TransportClient {
    async fn send(&self, batch: &[Message]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let raw = self.encode(batch)?;
        let compressed = self.compress(&raw)?;
        debug!(
            records = batch.len(),
            raw_bytes = raw.len(),
            compressed_bytes = compressed.len(),
            "Sending batch"
        );

        let request = self.build_request(raw.len(), compressed, &gmt_now())?;
        self.fire(request).await
    }
}

/// Status below 400 is success; otherwise decode the JSON error body
pub async fn validate_response(response: Response) -> Result<()> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(());
    }

    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    let body = response.bytes().await?;

    Err(delivery_error(status.as_u16(), request_id, &body)?.into())
}

/// Decode an error body into a [`DeliveryError`]; undecodable bodies are hard errors
pub fn delivery_error(http_status: u16, request_id: String, body: &[u8]) -> Result<DeliveryError> {
    let mut err: DeliveryError = serde_json::from_slice(body).map_err(ShipError::ResponseBody)?;
    err.http_status = http_status;
    err.request_id = request_id;
    Ok(err)
}

/// Current time as an RFC 1123 date in GMT
pub fn gmt_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ShipError::Signing(format!("invalid header value: {}", e)))
}
