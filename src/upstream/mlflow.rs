//! MLflow tracking server REST client.
//!
//! Only the calls needed to log an externally-trained model and register it:
//! experiments, runs, artifact upload through the artifact proxy, registered
//! models and model versions.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::upstream::client::{encode_segment, UpstreamClient, UpstreamError};

const API_PREFIX: &str = "/api/2.0/mlflow";
const ARTIFACTS_PREFIX: &str = "/api/2.0/mlflow-artifacts/artifacts";
const PROXIED_ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

/// A key/value pair, used for both params and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Terminal run states the console sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Finished,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub artifact_uri: Option<String>,
}

impl RunInfo {
    /// Artifact root relative to the artifact proxy.
    pub fn artifact_path(&self) -> String {
        match self
            .artifact_uri
            .as_deref()
            .and_then(|uri| uri.strip_prefix(PROXIED_ARTIFACT_SCHEME))
        {
            Some(rest) => rest.trim_matches('/').to_string(),
            None => format!("{}/{}/artifacts", self.experiment_id, self.run_id),
        }
    }

    /// Artifact URI of the run, or the proxied default.
    pub fn artifact_uri(&self) -> String {
        self.artifact_uri
            .clone()
            .unwrap_or_else(|| format!("{}/{}", PROXIED_ARTIFACT_SCHEME, self.artifact_path()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
struct ExperimentEnvelope {
    experiment: ExperimentId,
}

#[derive(Deserialize)]
struct ExperimentId {
    experiment_id: String,
}

#[derive(Deserialize)]
struct RunEnvelope {
    run: Run,
}

#[derive(Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Deserialize)]
struct ModelVersionEnvelope {
    model_version: ModelVersion,
}

/// MLflow client sharing the platform credentials.
#[derive(Clone)]
pub struct MlflowClient {
    client: UpstreamClient,
    upload_timeout: Duration,
}

impl MlflowClient {
    pub fn new(client: UpstreamClient, upload_timeout: Duration) -> Self {
        Self {
            client,
            upload_timeout,
        }
    }

    /// Id of the experiment called `name`, creating it when missing.
    pub async fn get_or_create_experiment(&self, name: &str) -> Result<String, UpstreamError> {
        let lookup: Result<ExperimentEnvelope, _> = self
            .client
            .get_json(
                &format!("{}/experiments/get-by-name", API_PREFIX),
                &[("experiment_name", name)],
            )
            .await;

        match lookup {
            Ok(envelope) => return Ok(envelope.experiment.experiment_id),
            Err(e) if is_missing(&e) => {}
            Err(e) => return Err(e),
        }

        tracing::info!(experiment = %name, "Creating MLflow experiment");
        let created: Option<ExperimentId> = self
            .client
            .post_json(
                &format!("{}/experiments/create", API_PREFIX),
                &json!({ "name": name }),
            )
            .await?;
        created
            .map(|e| e.experiment_id)
            .ok_or_else(|| missing_field("experiment_id"))
    }

    pub async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
        tags: &[KeyValue],
    ) -> Result<RunInfo, UpstreamError> {
        let body = json!({
            "experiment_id": experiment_id,
            "run_name": run_name,
            "start_time": now_millis(),
            "tags": tags,
        });
        let envelope: Option<RunEnvelope> = self
            .client
            .post_json(&format!("{}/runs/create", API_PREFIX), &body)
            .await?;
        envelope
            .map(|e| e.run.info)
            .ok_or_else(|| missing_field("run"))
    }

    pub async fn log_batch(
        &self,
        run_id: &str,
        params: &[KeyValue],
        tags: &[KeyValue],
    ) -> Result<(), UpstreamError> {
        let body = json!({ "run_id": run_id, "params": params, "tags": tags });
        let _: Option<Value> = self
            .client
            .post_json(&format!("{}/runs/log-batch", API_PREFIX), &body)
            .await?;
        Ok(())
    }

    /// Upload one file below the run's artifact root.
    pub async fn upload_artifact(
        &self,
        run: &RunInfo,
        relative_path: &str,
        bytes: Bytes,
    ) -> Result<(), UpstreamError> {
        let encoded: Vec<String> = run
            .artifact_path()
            .split('/')
            .chain(relative_path.split('/'))
            .filter(|s| !s.is_empty())
            .map(encode_segment)
            .collect();
        let path = format!("{}/{}", ARTIFACTS_PREFIX, encoded.join("/"));
        self.client.put_bytes(&path, bytes, self.upload_timeout).await
    }

    /// Create the registered model; an existing model with that name is fine.
    pub async fn create_registered_model(
        &self,
        name: &str,
        description: &str,
    ) -> Result<(), UpstreamError> {
        let body = json!({ "name": name, "description": description });
        let result: Result<Option<Value>, _> = self
            .client
            .post_json(&format!("{}/registered-models/create", API_PREFIX), &body)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(UpstreamError::Status { ref body, .. }) if body.contains("RESOURCE_ALREADY_EXISTS") => {
                tracing::debug!(model = %name, "Registered model already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
        description: &str,
    ) -> Result<ModelVersion, UpstreamError> {
        let body = json!({
            "name": name,
            "source": source,
            "run_id": run_id,
            "description": description,
        });
        let envelope: Option<ModelVersionEnvelope> = self
            .client
            .post_json(&format!("{}/model-versions/create", API_PREFIX), &body)
            .await?;
        envelope
            .map(|e| e.model_version)
            .ok_or_else(|| missing_field("model_version"))
    }

    pub async fn update_run(&self, run_id: &str, status: RunStatus) -> Result<(), UpstreamError> {
        let body = json!({ "run_id": run_id, "status": status, "end_time": now_millis() });
        let _: Option<Value> = self
            .client
            .post_json(&format!("{}/runs/update", API_PREFIX), &body)
            .await?;
        Ok(())
    }
}

fn is_missing(error: &UpstreamError) -> bool {
    match error {
        UpstreamError::Status { status, body } => {
            *status == StatusCode::NOT_FOUND || body.contains("RESOURCE_DOES_NOT_EXIST")
        }
        _ => false,
    }
}

fn missing_field(field: &'static str) -> UpstreamError {
    UpstreamError::Decode(<serde_json::Error as serde::de::Error>::missing_field(field))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(artifact_uri: Option<&str>) -> RunInfo {
        RunInfo {
            run_id: "r1".into(),
            experiment_id: "7".into(),
            artifact_uri: artifact_uri.map(String::from),
        }
    }

    #[test]
    fn test_artifact_path_from_proxied_uri() {
        let info = run(Some("mlflow-artifacts:/7/r1/artifacts"));
        assert_eq!(info.artifact_path(), "7/r1/artifacts");
        assert_eq!(info.artifact_uri(), "mlflow-artifacts:/7/r1/artifacts");
    }

    #[test]
    fn test_artifact_path_fallback() {
        let info = run(Some("s3://bucket/7/r1/artifacts"));
        assert_eq!(info.artifact_path(), "7/r1/artifacts");
        assert_eq!(info.artifact_uri(), "s3://bucket/7/r1/artifacts");

        let info = run(None);
        assert_eq!(info.artifact_uri(), "mlflow-artifacts:/7/r1/artifacts");
    }

    #[test]
    fn test_missing_detection() {
        let not_found = UpstreamError::Status {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert!(is_missing(&not_found));

        let bad_request = UpstreamError::Status {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error_code":"RESOURCE_DOES_NOT_EXIST"}"#.into(),
        };
        assert!(is_missing(&bad_request));

        let forbidden = UpstreamError::Status {
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        };
        assert!(!is_missing(&forbidden));
    }

    #[test]
    fn test_run_status_wire_format() {
        assert_eq!(serde_json::to_value(RunStatus::Finished).unwrap(), "FINISHED");
        assert_eq!(serde_json::to_value(RunStatus::Failed).unwrap(), "FAILED");
    }
}
