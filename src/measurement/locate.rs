//! Nearest measurement server discovery

use crate::error::Error;
use crate::Result;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Key of the download URL in a discovery result
pub const DOWNLOAD_URL_KEY: &str = "wss:///ndt/v7/download";

/// Key of the upload URL in a discovery result
pub const UPLOAD_URL_KEY: &str = "wss:///ndt/v7/upload";

/// A measurement server picked for one trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementServer {
    pub machine: String,
    pub download_url: String,
    pub upload_url: String,
}

#[derive(Debug, Deserialize)]
struct LocateResponse {
    #[serde(default)]
    results: Vec<LocateResult>,
}

#[derive(Debug, Deserialize)]
struct LocateResult {
    #[serde(default)]
    machine: String,
    #[serde(default)]
    urls: HashMap<String, String>,
}

/// Ask the locate service for the nearest server, with a fresh session id
pub async fn locate(
    client: &Client,
    locate_url: &str,
    client_name: &str,
    timeout: Duration,
) -> Result<MeasurementServer> {
    let session_id = Uuid::new_v4().to_string();

    let response = client
        .get(locate_url)
        .query(&[
            ("client_name", client_name),
            ("client_session_id", session_id.as_str()),
        ])
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::ServerDiscovery(format!("locate request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::ServerDiscovery(format!(
            "failed to get speed test server: {}",
            response.status().as_u16()
        )));
    }

    let body: LocateResponse = response
        .json()
        .await
        .map_err(|e| Error::ServerDiscovery(format!("invalid locate response: {}", e)))?;

    let mut first = body
        .results
        .into_iter()
        .next()
        .ok_or_else(|| Error::ServerDiscovery("no available speed test server".to_string()))?;

    let mut take = |key: &str| {
        first
            .urls
            .remove(key)
            .ok_or_else(|| Error::ServerDiscovery(format!("server result lacks {}", key)))
    };
    let download_url = take(DOWNLOAD_URL_KEY)?;
    let upload_url = take(UPLOAD_URL_KEY)?;

    Ok(MeasurementServer {
        machine: first.machine,
        download_url,
        upload_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn locate_with(server: &MockServer) -> Result<MeasurementServer> {
        let url = format!("{}/v2/nearest/ndt/ndt7", server.uri());
        locate(&Client::new(), &url, "speed-measurementlab-net-1", TIMEOUT).await
    }

    #[tokio::test]
    async fn test_locate_picks_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/nearest/ndt/ndt7"))
            .and(query_param("client_name", "speed-measurementlab-net-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {
                        "machine": "mlab1-abc0t.mlab-oti.measurement-lab.org",
                        "urls": {
                            "wss:///ndt/v7/download": "wss://a.example/ndt/v7/download?token=1",
                            "wss:///ndt/v7/upload": "wss://a.example/ndt/v7/upload?token=1"
                        }
                    },
                    {
                        "machine": "mlab2",
                        "urls": {}
                    }
                ]
            })))
            .mount(&server)
            .await;

        let found = locate_with(&server).await.unwrap();
        assert_eq!(found.machine, "mlab1-abc0t.mlab-oti.measurement-lab.org");
        assert_eq!(found.download_url, "wss://a.example/ndt/v7/download?token=1");
        assert_eq!(found.upload_url, "wss://a.example/ndt/v7/upload?token=1");

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default().to_string();
        assert!(query.contains("client_session_id="));
    }

    #[tokio::test]
    async fn test_locate_empty_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;

        let err = locate_with(&server).await.unwrap_err();
        assert!(matches!(err, Error::ServerDiscovery(_)));
    }

    #[tokio::test]
    async fn test_locate_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = locate_with(&server).await.unwrap_err();
        assert!(matches!(err, Error::ServerDiscovery(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_locate_missing_upload_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "machine": "mlab1",
                    "urls": { "wss:///ndt/v7/download": "wss://a.example/download" }
                }]
            })))
            .mount(&server)
            .await;

        let err = locate_with(&server).await.unwrap_err();
        assert!(err.to_string().contains(UPLOAD_URL_KEY));
    }
}
