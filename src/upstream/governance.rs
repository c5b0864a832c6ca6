//! Governance API calls: policies, bundles, stage assignees, users.

use serde::Serialize;
use serde_json::{json, Value};

use crate::upstream::client::{encode_segment, UpstreamClient, UpstreamError};

const GOVERNANCE_PREFIX: &str = "/api/governance/v1";
const USERS_PATH: &str = "/admin/user-management/users";
const USERS_PAGE_LIMIT: u32 = 500;

/// Payload for creating a governance bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBundle {
    pub name: String,
    pub policy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Typed view of the governance endpoints the console uses.
#[derive(Clone)]
pub struct GovernanceApi {
    client: UpstreamClient,
}

impl GovernanceApi {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    /// All policy overviews, as returned upstream.
    pub async fn policies(&self) -> Result<Value, UpstreamError> {
        self.client
            .get(&format!("{}/policy-overviews", GOVERNANCE_PREFIX))
            .await
    }

    /// All bundles, as returned upstream.
    pub async fn bundles(&self) -> Result<Value, UpstreamError> {
        self.client
            .get(&format!("{}/bundles", GOVERNANCE_PREFIX))
            .await
    }

    /// Set or clear the assignee of one bundle stage.
    ///
    /// Returns the upstream body, or `{"success": true}` when it is empty.
    pub async fn set_stage_assignee(
        &self,
        bundle_id: &str,
        stage_id: &str,
        assignee_id: Option<Value>,
    ) -> Result<Value, UpstreamError> {
        let path = format!(
            "{}/bundles/{}/stages/{}/assignee",
            GOVERNANCE_PREFIX,
            encode_segment(bundle_id),
            encode_segment(stage_id)
        );
        let body = json!({ "assigneeId": assignee_id });
        let response: Option<Value> = self.client.put_json(&path, &body).await?;
        Ok(response.unwrap_or_else(|| json!({ "success": true })))
    }

    /// First page of platform users (500 is enough for assignee pickers).
    pub async fn users(&self) -> Result<Vec<Value>, UpstreamError> {
        let query = [("limit", USERS_PAGE_LIMIT), ("offset", 0)];
        let data: Value = self.client.get_json(USERS_PATH, &query).await?;
        Ok(data
            .get("users")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Create a bundle governed by `policy_id`.
    pub async fn create_bundle(&self, bundle: &NewBundle) -> Result<Value, UpstreamError> {
        let path = format!("{}/bundles", GOVERNANCE_PREFIX);
        let response: Option<Value> = self.client.post_json(&path, bundle).await?;
        Ok(response.unwrap_or(Value::Null))
    }

    /// Attach a registered model version to a bundle.
    pub async fn attach_model_version(
        &self,
        bundle_id: &str,
        model_name: &str,
        version: &str,
    ) -> Result<Value, UpstreamError> {
        let path = format!(
            "{}/bundles/{}/attachments",
            GOVERNANCE_PREFIX,
            encode_segment(bundle_id)
        );
        let body = json!({
            "type": "ModelVersion",
            "identifier": { "name": model_name, "version": version },
        });
        let response: Option<Value> = self.client.post_json(&path, &body).await?;
        Ok(response.unwrap_or_else(|| json!({ "success": true })))
    }
}

/// Number of entries in the `data` array of a list response.
pub fn data_len(value: &Value) -> usize {
    value
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}
