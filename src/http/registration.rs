//! `POST /register-external-model`: multipart upload into the model registry.

use std::collections::HashMap;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::server::AppState;
use crate::registration::{RegistrationError, RegistrationForm, RegistrationOutcome, UploadedFile};

const REQUEST_ID_FIELD: &str = "requestId";

impl From<RegistrationError> for ApiError {
    fn from(error: RegistrationError) -> Self {
        match error {
            RegistrationError::Invalid(message) => ApiError::BadRequest(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn malformed(error: MultipartError) -> ApiError {
    let message = format!("Invalid multipart body: {}", error.body_text());
    match error.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(message),
        _ => ApiError::BadRequest(message),
    }
}

/// Text fields and file parts read so far.
#[derive(Default)]
struct Upload {
    fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
}

impl Upload {
    fn request_id(&self) -> Option<String> {
        self.fields
            .get(REQUEST_ID_FIELD)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }
}

/// Drain the multipart body into `upload`. Parts read before a failure stay in
/// `upload`, so an early `requestId` is still known to the caller.
async fn read_parts(multipart: &mut Multipart, upload: &mut Upload) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await.map_err(malformed)?;
                tracing::debug!(field = %name, file = %file_name, size = bytes.len(), "Received file part");
                upload.files.push(UploadedFile { file_name, bytes });
            }
            None => {
                let text = field.text().await.map_err(malformed)?;
                upload.fields.insert(name, text);
            }
        }
    }
    Ok(())
}

pub async fn register_external_model(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RegistrationOutcome>, ApiError> {
    let mut upload = Upload::default();
    let read = read_parts(&mut multipart, &mut upload).await;

    let request_id = upload
        .request_id()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let reporter = state.progress.reporter(request_id.clone());

    if let Err(e) = read {
        tracing::warn!(request_id = %request_id, status = %e.status(), error = %e, "Unreadable upload");
        reporter.fail("validate", e.to_string());
        reporter.finish();
        return Err(e);
    }

    tracing::info!(
        request_id = %request_id,
        files = upload.files.len(),
        listening = state.progress.is_subscribed(&request_id),
        "Register external model"
    );

    let form = match RegistrationForm::from_parts(request_id, upload.fields, upload.files) {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!(request_id = %reporter.request_id(), error = %e, "Rejected registration");
            reporter.fail(e.stage(), e.to_string());
            reporter.finish();
            return Err(e.into());
        }
    };

    let outcome = state.registrar.register(form, &reporter).await?;
    Ok(Json(outcome))
}
