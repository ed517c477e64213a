use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};
use tryon_contracts::jobs::JobSnapshot;
use tryon_contracts::models::ModelVersionId;
use tryon_contracts::redact::redact_map;

use crate::config::StudioConfig;
use crate::error::{StudioError, StudioResult};
use crate::jobs::JobQueueApi;
use crate::transport::{response_json_or_error, transport_error};

const PROVIDER: &str = "Replicate";

/// Predictions API client. Holds no credential; the token comes with each
/// call.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    api_base: String,
    http: HttpClient,
}

impl ReplicateClient {
    pub fn new(api_base: impl Into<String>, http: HttpClient) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn from_config(config: &StudioConfig, http: HttpClient) -> Self {
        Self::new(config.replicate_api_base.clone(), http)
    }

    fn predictions_endpoint(&self) -> String {
        format!("{}/predictions", self.api_base)
    }

    fn snapshot_from(payload: &Value) -> StudioResult<JobSnapshot> {
        JobSnapshot::from_value(payload)
            .ok_or_else(|| StudioError::decode(PROVIDER, "prediction payload has no id"))
    }
}

#[async_trait]
impl JobQueueApi for ReplicateClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %version))]
    async fn create_job(
        &self,
        api_token: &str,
        version: &ModelVersionId,
        input: &Map<String, Value>,
    ) -> StudioResult<JobSnapshot> {
        let redacted = Value::Object(redact_map(input));
        debug!(input = %redacted, "creating prediction");
        let payload = json!({
            "version": version.version(),
            "input": input,
        });
        let response = self
            .http
            .post(self.predictions_endpoint())
            .bearer_auth(api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let body = response_json_or_error(PROVIDER, response).await?;
        Self::snapshot_from(&body)
    }

    async fn fetch_job(&self, api_token: &str, job_id: &str) -> StudioResult<JobSnapshot> {
        let response = self
            .http
            .get(format!("{}/{}", self.predictions_endpoint(), job_id))
            .bearer_auth(api_token)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let body = response_json_or_error(PROVIDER, response).await?;
        Self::snapshot_from(&body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};
    use tryon_contracts::jobs::JobStatus;
    use tryon_contracts::models::ModelVersionId;

    use super::ReplicateClient;
    use crate::error::{ErrorKind, StudioError};
    use crate::jobs::JobQueueApi;
    use crate::testing::StubServer;

    fn version() -> anyhow::Result<ModelVersionId> {
        ModelVersionId::parse("acme/face-swap:abc123").map_err(anyhow::Error::msg)
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let client = ReplicateClient::new("http://localhost:9000/v1/", reqwest::Client::new());
        assert_eq!(
            client.predictions_endpoint(),
            "http://localhost:9000/v1/predictions"
        );
    }

    #[test]
    fn payload_without_id_is_a_decode_error() {
        let err = ReplicateClient::snapshot_from(&json!({"status": "starting"})).unwrap_err();
        assert!(err.to_string().contains("no id"));
    }

    #[tokio::test]
    async fn create_and_fetch_use_predictions_api_with_bearer_token() -> anyhow::Result<()> {
        let server = StubServer::start(vec![
            (201, json!({"id": "p-1", "status": "starting"}).to_string()),
            (
                200,
                json!({"id": "p-1", "status": "succeeded", "output": ["https://cdn/a.png"]})
                    .to_string(),
            ),
        ])
        .await?;
        let client = ReplicateClient::new(format!("{}/v1/", server.base), reqwest::Client::new());
        let mut input = Map::new();
        input.insert("image".to_string(), json!("data:image/png;base64,iVBOR"));

        let created = client.create_job("r8_token", &version()?, &input).await?;
        assert_eq!(created.id, "p-1");
        assert_eq!(created.status, JobStatus::Starting);
        let fetched = client.fetch_job("r8_token", "p-1").await?;
        assert_eq!(fetched.status, JobStatus::Succeeded);
        assert_eq!(fetched.output.canonical(), Some("https://cdn/a.png"));

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path_and_query, "/v1/predictions");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer r8_token"));
        assert_eq!(
            requests[0].body,
            json!({"version": "abc123", "input": {"image": "data:image/png;base64,iVBOR"}})
        );
        assert_eq!(requests[1].method, "GET");
        assert_eq!(requests[1].path_and_query, "/v1/predictions/p-1");
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer r8_token"));
        Ok(())
    }

    #[tokio::test]
    async fn non_success_replies_keep_status_and_truncated_body() -> anyhow::Result<()> {
        let server = StubServer::start(vec![
            (422, "x".repeat(600)),
            (503, "queue unavailable".to_string()),
        ])
        .await?;
        let client = ReplicateClient::new(format!("{}/v1", server.base), reqwest::Client::new());

        let err = client
            .create_job("r8_token", &version()?, &Map::new())
            .await
            .unwrap_err();
        match err {
            StudioError::Upstream { status, ref body, .. } => {
                assert_eq!(status, 422);
                assert_eq!(body, &format!("{}…", "x".repeat(512)));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = client.fetch_job("r8_token", "p-1").await.unwrap_err();
        assert!(matches!(err, StudioError::Upstream { status: 503, .. }));
        assert_eq!(err.kind(), ErrorKind::UpstreamRejection);
        Ok(())
    }
}
