//! HTTP binding for the downstream resource control plane.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use crate::executor::{Credentials, ResourceApi, ResourceApiError};

pub struct HttpResourceApi {
    client: reqwest::Client,
}

impl HttpResourceApi {
    pub fn new(timeout_secs: u64) -> Result<Self, ResourceApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| ResourceApiError::Transport(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResourceApi for HttpResourceApi {
    async fn invoke(
        &self,
        action_name: &str,
        parameters: &Map<String, Value>,
        credentials: &Credentials,
    ) -> Result<Value, ResourceApiError> {
        let url = format!(
            "{}/api/{action_name}",
            credentials.region_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", auth_header(credentials))
            .json(parameters)
            .send()
            .await
            .map_err(|error| ResourceApiError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ResourceApiError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(ResourceApiError::Validation(format!("{status}: {body}")));
        }

        serde_json::from_str(&body)
            .map_err(|error| ResourceApiError::Transport(format!("invalid response body: {error}")))
    }
}

/// The control plane expects the kubeconfig percent-encoded in the
/// Authorization header; raw kubeconfig YAML is multi-line and would not
/// survive as a header value.
fn auth_header(credentials: &Credentials) -> String {
    urlencoding::encode(credentials.kubeconfig.expose_secret()).into_owned()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{auth_header, Credentials};

    #[test]
    fn kubeconfig_header_survives_newlines_and_colons() {
        let credentials = Credentials {
            kubeconfig: SecretString::from("apiVersion: v1\nkind: Config"),
            region_url: "https://region.example".to_string(),
        };
        let encoded = auth_header(&credentials);
        assert_eq!(encoded, "apiVersion%3A%20v1%0Akind%3A%20Config");
        assert!(!encoded.contains('\n'));
    }
}
