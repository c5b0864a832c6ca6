//! External model registration.
//!
//! # Data Flow
//! ```text
//! multipart upload (http/registration.rs)
//!     → RegistrationForm::from_parts (validate)
//!     → Registrar::register
//!         → MLflow: experiment → run → params/tags → artifacts
//!         → MLflow: registered model → model version
//!         → governance: bundle + attachment (only with a policy)
//!         → MLflow: run FINISHED
//!     → ProgressReporter (one event per stage, then done)
//! ```
//!
//! # Design Decisions
//! - Stages run strictly in order; the first failure stops the workflow
//! - A run that was created is always closed, FAILED on error
//! - The progress queue always receives the done marker

use std::collections::HashMap;

use axum::body::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::observability::metrics;
use crate::progress::ProgressReporter;
use crate::upstream::governance::{GovernanceApi, NewBundle};
use crate::upstream::mlflow::{KeyValue, MlflowClient, ModelVersion, RunInfo, RunStatus};
use crate::upstream::UpstreamError;

const MODEL_DIR: &str = "model";
const MLMODEL_FILE: &str = "MLmodel";

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Validated registration input.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub request_id: String,
    pub model_name: String,
    pub description: String,
    pub model_type: String,
    pub framework: Option<String>,
    pub policy_id: Option<String>,
    pub bundle_name: Option<String>,
    pub params: Vec<KeyValue>,
    pub files: Vec<UploadedFile>,
}

impl RegistrationForm {
    /// Build the form from multipart text fields and file parts.
    pub fn from_parts(
        request_id: String,
        mut fields: HashMap<String, String>,
        files: Vec<UploadedFile>,
    ) -> Result<Self, RegistrationError> {
        let mut take = |name: &str| {
            fields
                .remove(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let model_name = take("modelName")
            .ok_or_else(|| RegistrationError::Invalid("modelName is required".into()))?;
        if model_name.contains('/') {
            return Err(RegistrationError::Invalid(
                "modelName must not contain '/'".into(),
            ));
        }

        let description = take("description").unwrap_or_default();
        let model_type = take("modelType").unwrap_or_else(|| "external".to_string());
        let framework = take("framework");
        let policy_id = take("policyId");
        let bundle_name = take("bundleName");
        let params = match take("params") {
            Some(raw) => parse_params(&raw)?,
            None => Vec::new(),
        };

        let mut cleaned = Vec::with_capacity(files.len());
        for file in files {
            let file_name = file
                .file_name
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if file_name.is_empty() || file_name == "." || file_name == ".." {
                return Err(RegistrationError::Invalid(format!(
                    "invalid file name '{}'",
                    file.file_name
                )));
            }
            cleaned.push(UploadedFile {
                file_name,
                bytes: file.bytes,
            });
        }
        if cleaned.is_empty() {
            return Err(RegistrationError::Invalid(
                "at least one model file is required".into(),
            ));
        }

        Ok(Self {
            request_id,
            model_name,
            description,
            model_type,
            framework,
            policy_id,
            bundle_name,
            params,
            files: cleaned,
        })
    }

    fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.bytes.len()).sum()
    }

    fn ships_mlmodel(&self) -> bool {
        self.files.iter().any(|f| f.file_name == MLMODEL_FILE)
    }
}

fn parse_params(raw: &str) -> Result<Vec<KeyValue>, RegistrationError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| RegistrationError::Invalid(format!("params is not valid JSON: {}", e)))?;
    let Value::Object(map) = value else {
        return Err(RegistrationError::Invalid(
            "params must be a JSON object".into(),
        ));
    };
    Ok(map
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => KeyValue::new(key, s),
            other => KeyValue::new(key, other.to_string()),
        })
        .collect())
}

/// Successful registration, returned to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub success: bool,
    pub request_id: String,
    pub model_name: String,
    pub model_version: String,
    pub experiment_id: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Invalid(String),

    #[error("{stage} failed: {source}")]
    Upstream {
        stage: &'static str,
        #[source]
        source: UpstreamError,
    },

    #[error("governance bundle response did not include an id")]
    MissingBundleId,
}

impl RegistrationError {
    /// Progress step the failure belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            RegistrationError::Invalid(_) => "validate",
            RegistrationError::Upstream { stage, .. } => *stage,
            RegistrationError::MissingBundleId => "bundle",
        }
    }
}

fn at(stage: &'static str) -> impl FnOnce(UpstreamError) -> RegistrationError {
    move |source| RegistrationError::Upstream { stage, source }
}

/// Runs the registration workflow against MLflow and governance.
#[derive(Clone)]
pub struct Registrar {
    mlflow: MlflowClient,
    governance: GovernanceApi,
    experiment_prefix: String,
    project_id: Option<String>,
}

impl Registrar {
    pub fn new(
        mlflow: MlflowClient,
        governance: GovernanceApi,
        experiment_prefix: impl Into<String>,
        project_id: Option<String>,
    ) -> Self {
        Self {
            mlflow,
            governance,
            experiment_prefix: experiment_prefix.into(),
            project_id: project_id.filter(|p| !p.is_empty()),
        }
    }

    /// Register the model, reporting every stage. Always ends the progress stream.
    pub async fn register(
        &self,
        form: RegistrationForm,
        progress: &ProgressReporter,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let result = self.run_stages(&form, progress).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    request_id = %form.request_id,
                    model = %outcome.model_name,
                    version = %outcome.model_version,
                    "Model registered"
                );
                progress.success(
                    "complete",
                    format!(
                        "Registered {} version {}",
                        outcome.model_name, outcome.model_version
                    ),
                );
            }
            Err(e) => {
                tracing::error!(
                    request_id = %form.request_id,
                    model = %form.model_name,
                    stage = e.stage(),
                    error = %e,
                    "Model registration failed"
                );
                progress.fail(e.stage(), e.to_string());
            }
        }
        metrics::record_registration(result.is_ok());
        progress.finish();
        result
    }

    async fn run_stages(
        &self,
        form: &RegistrationForm,
        progress: &ProgressReporter,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        progress.step(
            "validate",
            format!(
                "Received {} file(s), {} bytes, for {}",
                form.files.len(),
                form.total_bytes(),
                form.model_name
            ),
            5,
        );

        let experiment_name = format!("{}{}", self.experiment_prefix, form.model_name);
        progress.step(
            "experiment",
            format!("Preparing experiment {}", experiment_name),
            15,
        );
        let experiment_id = self
            .mlflow
            .get_or_create_experiment(&experiment_name)
            .await
            .map_err(at("experiment"))?;

        progress.step("run", "Creating MLflow run", 25);
        let run_name = format!("register-{}", form.model_name);
        let run = self
            .mlflow
            .create_run(&experiment_id, &run_name, &run_tags(form))
            .await
            .map_err(at("run"))?;

        let (version, bundle_id) = match self.complete_run(form, &run, progress).await {
            Ok(done) => done,
            Err(e) => {
                if let Err(close_err) = self.mlflow.update_run(&run.run_id, RunStatus::Failed).await {
                    tracing::warn!(run_id = %run.run_id, error = %close_err, "Failed to mark run as failed");
                }
                return Err(e);
            }
        };

        Ok(RegistrationOutcome {
            success: true,
            request_id: form.request_id.clone(),
            model_name: version.name,
            model_version: version.version,
            experiment_id,
            run_id: run.run_id,
            bundle_id,
        })
    }

    /// Everything after run creation. The run is only marked FINISHED once the
    /// model is registered and, with a policy, attached to its bundle.
    async fn complete_run(
        &self,
        form: &RegistrationForm,
        run: &RunInfo,
        progress: &ProgressReporter,
    ) -> Result<(ModelVersion, Option<String>), RegistrationError> {
        let version = self.log_and_register(form, run, progress).await?;

        let bundle_id = match &form.policy_id {
            Some(policy_id) => Some(self.govern(form, policy_id, &version, progress).await?),
            None => None,
        };

        progress.step("finalize", "Closing MLflow run", 98);
        self.mlflow
            .update_run(&run.run_id, RunStatus::Finished)
            .await
            .map_err(at("finalize"))?;

        Ok((version, bundle_id))
    }

    async fn log_and_register(
        &self,
        form: &RegistrationForm,
        run: &RunInfo,
        progress: &ProgressReporter,
    ) -> Result<ModelVersion, RegistrationError> {
        progress.step("params", "Logging parameters", 30);
        let mut params = vec![
            KeyValue::new("model_name", &form.model_name),
            KeyValue::new("model_type", &form.model_type),
        ];
        params.extend(form.params.iter().cloned());
        self.mlflow
            .log_batch(&run.run_id, &params, &[])
            .await
            .map_err(at("params"))?;

        let count = form.files.len();
        for (i, file) in form.files.iter().enumerate() {
            let pct = 35 + (40 * i / count) as u8;
            progress.step(
                "upload",
                format!("Uploading {} ({}/{})", file.file_name, i + 1, count),
                pct,
            );
            self.mlflow
                .upload_artifact(
                    run,
                    &format!("{}/{}", MODEL_DIR, file.file_name),
                    file.bytes.clone(),
                )
                .await
                .map_err(at("upload"))?;
        }
        if !form.ships_mlmodel() {
            self.mlflow
                .upload_artifact(
                    run,
                    &format!("{}/{}", MODEL_DIR, MLMODEL_FILE),
                    Bytes::from(mlmodel_descriptor(form, &run.run_id)),
                )
                .await
                .map_err(at("upload"))?;
        }

        progress.step(
            "register",
            format!("Registering model {}", form.model_name),
            80,
        );
        self.mlflow
            .create_registered_model(&form.model_name, &form.description)
            .await
            .map_err(at("register"))?;

        let source = format!("{}/{}", run.artifact_uri().trim_end_matches('/'), MODEL_DIR);
        let version = self
            .mlflow
            .create_model_version(&form.model_name, &source, &run.run_id, &form.description)
            .await
            .map_err(at("register"))?;
        progress.step(
            "register",
            format!("Created version {} of {}", version.version, version.name),
            88,
        );

        Ok(version)
    }

    async fn govern(
        &self,
        form: &RegistrationForm,
        policy_id: &str,
        version: &ModelVersion,
        progress: &ProgressReporter,
    ) -> Result<String, RegistrationError> {
        let name = form
            .bundle_name
            .clone()
            .unwrap_or_else(|| format!("{} v{}", version.name, version.version));
        progress.step("bundle", format!("Creating governance bundle {}", name), 92);

        let bundle = NewBundle {
            name,
            policy_id: policy_id.to_string(),
            project_id: self.project_id.clone(),
        };
        let created = self
            .governance
            .create_bundle(&bundle)
            .await
            .map_err(at("bundle"))?;
        let bundle_id = created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(RegistrationError::MissingBundleId)?;

        progress.step("bundle", "Attaching model version to bundle", 96);
        self.governance
            .attach_model_version(&bundle_id, &version.name, &version.version)
            .await
            .map_err(at("bundle"))?;

        Ok(bundle_id)
    }
}

fn run_tags(form: &RegistrationForm) -> Vec<KeyValue> {
    let mut tags = vec![
        KeyValue::new("source", "external-upload"),
        KeyValue::new("model_type", &form.model_type),
        KeyValue::new(
            "uploaded_files",
            form.files
                .iter()
                .map(|f| f.file_name.as_str())
                .collect::<Vec<_>>()
                .join(","),
        ),
    ];
    if let Some(framework) = &form.framework {
        tags.push(KeyValue::new("framework", framework));
    }
    if let Some(policy_id) = &form.policy_id {
        tags.push(KeyValue::new("governance_policy_id", policy_id));
    }
    tags
}

/// Minimal MLmodel descriptor so the registry recognises the artifact directory.
fn mlmodel_descriptor(form: &RegistrationForm, run_id: &str) -> String {
    let quote = |s: &str| format!("'{}'", s.replace('\'', "''"));

    let mut out = String::new();
    out.push_str(&format!("artifact_path: {}\n", MODEL_DIR));
    out.push_str("flavors:\n  external:\n");
    out.push_str(&format!("    model_type: {}\n", quote(&form.model_type)));
    if let Some(framework) = &form.framework {
        out.push_str(&format!("    framework: {}\n", quote(framework)));
    }
    out.push_str("    files:\n");
    for file in &form.files {
        out.push_str(&format!("    - {}\n", quote(&file.file_name)));
    }
    out.push_str(&format!("model_uuid: {}\n", uuid::Uuid::new_v4().simple()));
    out.push_str(&format!("run_id: {}\n", run_id));
    out
}
