//! HTTP client for the roll portal API
//!
//! This module owns every request the crawler makes:
//! - Building the cookie-keeping HTTP client
//! - Opening a portal session
//! - Catalog listings (bare JSON arrays and `{status, message, payload}` envelopes)
//! - Captcha challenges
//! - Document downloads per variant
//!
//! Transport failures and unexpected statuses are reported as
//! `Failure::DelayedRetry`; deciding what a document reply means is left to
//! the fetcher.

use super::retry::{Failure, Outcome};
use crate::captcha::CaptchaChallenge;
use crate::catalog::{ConstituencyInfo, DocumentVariant};
use crate::config::SourceConfig;
use crate::{HarvestError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Status value of a successful API reply
pub const SUCCESS_STATUS: &str = "Success";

/// Body of the language and part listing requests
#[derive(Debug, Clone, Serialize)]
pub struct ConstituencyQuery {
    #[serde(rename = "acNumber")]
    pub ac_number: u32,

    #[serde(rename = "districtCd")]
    pub district_code: String,

    #[serde(rename = "stateCd")]
    pub state_code: String,
}

impl From<&ConstituencyInfo> for ConstituencyQuery {
    fn from(info: &ConstituencyInfo) -> Self {
        Self {
            ac_number: info.number,
            district_code: info.district_code.clone(),
            state_code: info.state_code.clone(),
        }
    }
}

/// Body of a document download request
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRequest {
    #[serde(rename = "acNumber")]
    pub ac_number: u32,

    pub captcha: String,

    #[serde(rename = "captchaId")]
    pub captcha_id: String,

    #[serde(rename = "districtCd")]
    pub district_code: String,

    #[serde(rename = "langCd")]
    pub language: String,

    #[serde(rename = "partNumber")]
    pub part_number: u32,

    #[serde(rename = "stateCd")]
    pub state_code: String,
}

/// Undecoded reply of a document endpoint
#[derive(Debug, Clone)]
pub struct DocumentReply {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CaptchaReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    captcha: Option<String>,
}

/// Builds an HTTP client with proper configuration
///
/// The client keeps cookies so every request after `open_session` rides on
/// the portal session.
pub fn build_http_client(source: &SourceConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(source.user_agent.as_str())
        .timeout(Duration::from_secs(source.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

fn transport_failure(url: &Url, err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::DelayedRetry(format!("request to {} timed out", url))
    } else {
        Failure::DelayedRetry(format!("request to {} failed: {}", url, err))
    }
}

/// Portal API client bound to one session's cookie jar
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    source: SourceConfig,
}

impl ApiClient {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(source)?,
            source: source.clone(),
        })
    }

    /// Full URL of an endpoint path
    pub fn endpoint_url(&self, path: &str) -> Result<Url> {
        let joined = format!("{}{}", self.source.api_base_url.trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| HarvestError::Catalog(format!("bad endpoint URL {}: {}", joined, e)))
    }

    /// Endpoint path of a document variant
    pub fn variant_path(&self, variant: DocumentVariant) -> &str {
        let endpoints = &self.source.endpoints;
        match variant {
            DocumentVariant::Draft => &endpoints.draft,
            DocumentVariant::Final => &endpoints.final_roll,
            DocumentVariant::General => &endpoints.general,
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Fetches the portal landing page to obtain session cookies
    pub async fn open_session(&self) -> Result<()> {
        let url = &self.source.portal_url;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| HarvestError::Http {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HarvestError::Session(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        tracing::debug!("Opened portal session at {}", url);
        Ok(())
    }

    /// GETs a listing endpoint that replies with a bare JSON document
    ///
    /// Returns the body text after checking it parses.
    pub async fn get_listing(&self, path: &str) -> Outcome<String> {
        let url = self.endpoint_url(path)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_failure(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::DelayedRetry(format!("{} returned {}", url, status)));
        }

        let body = response.text().await.map_err(|e| transport_failure(&url, e))?;
        if let Err(e) = serde_json::from_str::<serde_json::Value>(&body) {
            return Err(Failure::DelayedRetry(format!("malformed reply from {}: {}", url, e)));
        }
        Ok(body)
    }

    /// POSTs a constituency query to an envelope endpoint and returns its payload
    pub async fn post_listing(&self, path: &str, query: &ConstituencyQuery) -> Outcome<serde_json::Value> {
        let url = self.endpoint_url(path)?;
        let response = self
            .client
            .post(url.clone())
            .json(query)
            .send()
            .await
            .map_err(|e| transport_failure(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::DelayedRetry(format!("{} returned {}", url, status)));
        }

        let body = response.text().await.map_err(|e| transport_failure(&url, e))?;
        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| Failure::DelayedRetry(format!("malformed reply from {}: {}", url, e)))?;

        if envelope.status != SUCCESS_STATUS {
            return Err(Failure::DelayedRetry(format!(
                "{} replied {}: {}",
                url,
                envelope.status,
                envelope.message.unwrap_or_default()
            )));
        }
        Ok(envelope.payload)
    }

    /// Requests a fresh captcha challenge
    pub async fn captcha(&self) -> Outcome<CaptchaChallenge> {
        let url = self.endpoint_url(&self.source.endpoints.captcha)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_failure(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::DelayedRetry(format!(
                "captcha endpoint returned {}",
                status
            )));
        }

        let body = response.text().await.map_err(|e| transport_failure(&url, e))?;
        let reply: CaptchaReply = serde_json::from_str(&body)
            .map_err(|e| Failure::DelayedRetry(format!("malformed captcha reply: {}", e)))?;

        if reply.status != SUCCESS_STATUS {
            return Err(Failure::DelayedRetry(format!(
                "captcha endpoint replied {}: {}",
                reply.status,
                reply.message.unwrap_or_default()
            )));
        }

        let (Some(id), Some(encoded)) = (reply.id, reply.captcha) else {
            return Err(Failure::DelayedRetry("got empty captcha".to_string()));
        };
        let image = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Failure::DelayedRetry(format!("captcha image is not base64: {}", e)))?;

        Ok(CaptchaChallenge { id, image })
    }

    /// Submits a download request to a variant's endpoint
    pub async fn request_document(
        &self,
        variant: DocumentVariant,
        request: &DownloadRequest,
    ) -> Outcome<DocumentReply> {
        let url = self.endpoint_url(self.variant_path(variant))?;
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| transport_failure(&url, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_failure(&url, e))?;
        Ok(DocumentReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, ResponseMarkers};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(base: &str) -> SourceConfig {
        SourceConfig {
            portal_url: format!("{}/portal", base),
            api_base_url: format!("{}/api/v1/", base),
            user_agent: "test-agent".to_string(),
            timeout_secs: 5,
            endpoints: EndpointConfig::default(),
            markers: ResponseMarkers::default(),
        }
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let api = ApiClient::new(&source("https://gateway.example.org")).unwrap();
        assert_eq!(
            api.endpoint_url("/common/states/").unwrap().as_str(),
            "https://gateway.example.org/api/v1/common/states/"
        );
        assert_eq!(
            api.variant_path(DocumentVariant::General),
            "/printing-publish/generate-published-geroll"
        );
    }

    #[test]
    fn test_download_request_field_names() {
        let request = DownloadRequest {
            ac_number: 12,
            captcha: "ab12".to_string(),
            captcha_id: "c-1".to_string(),
            district_code: "S0401".to_string(),
            language: "ENG".to_string(),
            part_number: 3,
            state_code: "S04".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "acNumber": 12,
                "captcha": "ab12",
                "captchaId": "c-1",
                "districtCd": "S0401",
                "langCd": "ENG",
                "partNumber": 3,
                "stateCd": "S04"
            })
        );
    }

    #[tokio::test]
    async fn test_open_session_requires_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portal"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = ApiClient::new(&source(&server.uri())).unwrap();
        assert!(matches!(
            api.open_session().await,
            Err(HarvestError::Session(_))
        ));
    }

    #[tokio::test]
    async fn test_post_listing_unwraps_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/printing-publish/get-ac-languages"))
            .and(body_json(serde_json::json!({
                "acNumber": 12, "districtCd": "S0401", "stateCd": "S04"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Success", "message": null, "payload": ["ENG", "HIN"]
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(&source(&server.uri())).unwrap();
        let query = ConstituencyQuery {
            ac_number: 12,
            district_code: "S0401".to_string(),
            state_code: "S04".to_string(),
        };
        let payload = api
            .post_listing("/printing-publish/get-ac-languages", &query)
            .await
            .unwrap();
        assert_eq!(payload, serde_json::json!(["ENG", "HIN"]));
    }

    #[tokio::test]
    async fn test_post_listing_failure_status_is_delayed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Failed", "message": "try later", "payload": null
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(&source(&server.uri())).unwrap();
        let query = ConstituencyQuery {
            ac_number: 1,
            district_code: "D".to_string(),
            state_code: "S".to_string(),
        };
        assert!(matches!(
            api.post_listing("/printing-publish/get-part-list", &query).await,
            Err(Failure::DelayedRetry(_))
        ));
    }

    #[tokio::test]
    async fn test_captcha_decodes_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/captcha-service/generateCaptcha/EROLL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Success", "id": "cap-9", "captcha": STANDARD.encode(b"\x89PNG")
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(&source(&server.uri())).unwrap();
        let challenge = api.captcha().await.unwrap();
        assert_eq!(challenge.id, "cap-9");
        assert_eq!(challenge.image, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_null_captcha_is_delayed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Success", "id": "cap-9", "captcha": null
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(&source(&server.uri())).unwrap();
        assert!(matches!(api.captcha().await, Err(Failure::DelayedRetry(_))));
    }
}
