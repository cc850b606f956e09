use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::ports::{ConvertError, PartConverter};

#[derive(Serialize)]
struct ConvertRequestBody<'a> {
    html_str: &'a str,
}

#[derive(Deserialize)]
struct ConvertResponseBody {
    success: bool,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Conversion capability backed by an HTML-to-markdown HTTP service.
///
/// Error mapping: connection errors and 5xx/429 responses are transient
/// (the coordinator retries them); 4xx responses and non-UTF-8 input are
/// permanent.
pub struct HttpConverter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpConverter {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConvertError::Permanent(format!("client build: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/tomd/html", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl PartConverter for HttpConverter {
    async fn convert(&self, data: &[u8]) -> Result<String, ConvertError> {
        let html = std::str::from_utf8(data)
            .map_err(|e| ConvertError::Permanent(format!("part is not valid UTF-8: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ConvertRequestBody { html_str: html })
            .send()
            .await
            .map_err(|e| ConvertError::Transient(format!("request: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ConvertError::Transient(format!(
                "converter returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(ConvertError::Permanent(format!(
                "converter returned {status}"
            )));
        }

        let body: ConvertResponseBody = response
            .json()
            .await
            .map_err(|e| ConvertError::Transient(format!("response body: {e}")))?;

        if !body.success {
            return Err(ConvertError::Permanent(
                body.detail
                    .unwrap_or_else(|| "converter reported failure".to_string()),
            ));
        }

        body.markdown
            .ok_or_else(|| ConvertError::Permanent("converter returned no markdown".to_string()))
    }
}
