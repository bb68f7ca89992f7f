use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::{CoreResult, ForgeError};
use crate::http_client::HttpClient;
use crate::model::{
    ContainerList, ContainerLogs, ContainerStatusResponse, CreateContainerRequest,
    CreateContainerResponse, DeleteContainerResponse, ExecuteRequest, ExecuteResponse,
};
use crate::normalizer::validate_app_id;
use crate::poll::{Poller, RetryPolicy, StatusProbe};

pub const DEFAULT_FRAMEWORK: &str = "react-native";

/// Client for the sandbox lifecycle endpoints under `/api/containers`.
#[derive(Debug, Clone)]
pub struct ContainerClient {
    http: HttpClient,
    base: String,
    policy: RetryPolicy,
}

impl ContainerClient {
    pub fn new(http: HttpClient, base: impl Into<String>, policy: RetryPolicy) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { http, base, policy }
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str, policy: RetryPolicy) -> Self {
        Self::new(HttpClient::new_default().unwrap(), server_base, policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn url(&self, app_id: &str, action: &str) -> CoreResult<String> {
        let id = validate_app_id(app_id)?;
        Ok(format!("{}/api/containers/{id}/{action}", self.base))
    }

    pub async fn create_container(
        &self,
        app_id: &str,
        description: &str,
        framework: &str,
    ) -> CoreResult<CreateContainerResponse> {
        validate_app_id(app_id)?;
        let body = CreateContainerRequest {
            app_id: app_id.to_string(),
            app_description: description.to_string(),
            framework: framework.to_string(),
        };
        let url = format!("{}/api/containers/create", self.base);
        let resp: CreateContainerResponse = self.http.post_json(&url, &body).await?;
        tracing::info!(
            "app.id" = app_id,
            preview_url = resp.preview_url.as_deref().unwrap_or(""),
            "container requested"
        );
        Ok(resp)
    }

    /// Current status. A 404 is an expected transient state while polling and
    /// comes back as `success: false` rather than an error.
    pub async fn container_status(&self, app_id: &str) -> CoreResult<ContainerStatusResponse> {
        let url = self.url(app_id, "status")?;
        match self.http.get_json::<ContainerStatusResponse>(&url).await {
            Err(e) if e.is_not_found() => Ok(ContainerStatusResponse::not_found(app_id)),
            other => other,
        }
    }

    pub async fn container_logs(&self, app_id: &str) -> CoreResult<ContainerLogs> {
        let url = self.url(app_id, "logs")?;
        self.http.get_json(&url).await
    }

    /// Run a command in the sandbox. Readiness is the caller's concern; see
    /// [`ContainerClient::wait_for_container`].
    pub async fn execute_command(&self, app_id: &str, command: &str) -> CoreResult<ExecuteResponse> {
        if command.trim().is_empty() {
            return Err(ForgeError::Validation("command must not be empty".into()));
        }
        let url = self.url(app_id, "execute")?;
        let body = ExecuteRequest {
            command: command.to_string(),
        };
        self.http.post_json(&url, &body).await
    }

    pub async fn delete_container(&self, app_id: &str) -> CoreResult<DeleteContainerResponse> {
        let url = self.url(app_id, "delete")?;
        self.http.delete_json(&url).await
    }

    pub async fn list_containers(&self) -> CoreResult<ContainerList> {
        let url = format!("{}/api/containers/list", self.base);
        self.http.get_json(&url).await
    }

    /// Poll with the client's default policy until the container is running.
    pub async fn wait_for_container(&self, app_id: &str) -> CoreResult<ContainerStatusResponse> {
        self.wait_for_container_with(app_id, &self.policy, &CancelToken::new())
            .await
    }

    pub async fn wait_for_container_with(
        &self,
        app_id: &str,
        policy: &RetryPolicy,
        cancel: &CancelToken,
    ) -> CoreResult<ContainerStatusResponse> {
        validate_app_id(app_id)?;
        Poller::new(policy.clone())
            .with_cancel(cancel.clone())
            .wait(self, app_id)
            .await
    }
}

#[async_trait]
impl StatusProbe for ContainerClient {
    async fn probe(&self, app_id: &str) -> CoreResult<ContainerStatusResponse> {
        self.container_status(app_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContainerStatus;
    use httpmock::Method::{DELETE, GET, POST};
    use httpmock::MockServer;
    use serde_json::json;
    use std::time::Duration;

    fn fast_policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn create_posts_snake_case_body() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/api/containers/create").json_body(json!({
                "app_id": "todo",
                "app_description": "A todo list",
                "framework": "react-native"
            }));
            then.status(200).json_body(json!({
                "success": true,
                "container_name": "dev-todo",
                "app_id": "todo",
                "preview_url": "https://preview-todo.example",
                "dev_url": "https://dev-todo.example",
                "status": "creating"
            }));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        let resp = client
            .create_container("todo", "A todo list", DEFAULT_FRAMEWORK)
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.status, ContainerStatus::Creating);
        assert_eq!(resp.dev_url.as_deref(), Some("https://dev-todo.example"));
        m.assert();
    }

    #[tokio::test]
    async fn status_404_maps_to_not_found() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/containers/todo/status");
            then.status(404).json_body(json!({"success": false, "error": "Container not found"}));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        let s = client.container_status("todo").await.unwrap();
        assert!(!s.success);
        assert_eq!(s.error.as_deref(), Some("Container not found"));
    }

    #[tokio::test]
    async fn status_500_is_an_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/containers/todo/status");
            then.status(500).json_body(json!({"error": "kube api down"}));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        let err = client.container_status("todo").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn execute_sends_command() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/api/containers/todo/execute")
                .json_body(json!({"command": "npm install"}));
            then.status(200).json_body(json!({
                "success": true,
                "app_id": "todo",
                "command": "npm install",
                "output": "added 1 package",
                "exit_code": 0
            }));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        let out = client.execute_command("todo", "npm install").await.unwrap();
        assert_eq!(out.output, "added 1 package");
        assert_eq!(out.exit_code, Some(0));
        m.assert();
    }

    #[tokio::test]
    async fn empty_command_and_bad_id_never_hit_the_wire() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.any_request();
            then.status(200).json_body(json!({}));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        assert!(matches!(
            client.execute_command("todo", "  ").await,
            Err(ForgeError::Validation(_))
        ));
        assert!(matches!(
            client.container_status("../secrets").await,
            Err(ForgeError::Validation(_))
        ));
        m.assert_hits(0);
    }

    #[tokio::test]
    async fn delete_list_and_logs() {
        let server = MockServer::start();
        let d = server.mock(|when, then| {
            when.method(DELETE).path("/api/containers/todo/delete");
            then.status(200).json_body(json!({"success": true, "app_id": "todo", "message": "deleted"}));
        });
        let l = server.mock(|when, then| {
            when.method(GET).path("/api/containers/list");
            then.status(200).json_body(json!({
                "success": true,
                "containers": [
                    {"app_id": "todo", "container_name": "dev-todo", "status": "Running", "created_at": null},
                    {"app_id": "chat", "container_name": "dev-chat", "status": "Pending"}
                ]
            }));
        });
        let g = server.mock(|when, then| {
            when.method(GET).path("/api/containers/todo/logs");
            then.status(200).json_body(json!({"success": true, "app_id": "todo", "logs": "ready\n"}));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        assert!(client.delete_container("todo").await.unwrap().success);
        let list = client.list_containers().await.unwrap();
        assert_eq!(list.containers.len(), 2);
        assert_eq!(list.containers[1].status, ContainerStatus::Pending);
        assert_eq!(client.container_logs("todo").await.unwrap().logs, "ready\n");
        d.assert();
        l.assert();
        g.assert();
    }

    #[tokio::test]
    async fn wait_returns_running_payload() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/api/containers/todo/status");
            then.status(200).json_body(json!({
                "success": true,
                "app_id": "todo",
                "pod_status": "Running",
                "preview_url": "https://preview-todo.example"
            }));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        let s = client.wait_for_container("todo").await.unwrap();
        assert_eq!(s.pod_status, ContainerStatus::Running);
        assert_eq!(s.record("todo").preview_url.as_deref(), Some("https://preview-todo.example"));
        m.assert_hits(1);
    }

    #[tokio::test]
    async fn wait_reports_failed_pod() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/containers/todo/status");
            then.status(200).json_body(json!({"success": true, "pod_status": "Failed"}));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        let err = client.wait_for_container("todo").await.unwrap_err();
        assert!(matches!(err, ForgeError::ContainerFailed { .. }));
    }

    #[tokio::test]
    async fn wait_times_out_while_not_found() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/api/containers/todo/status");
            then.status(404).json_body(json!({"success": false, "error": "Container not found"}));
        });
        let client = ContainerClient::new_for_tests(&server.base_url(), fast_policy(3));
        let err = client.wait_for_container("todo").await.unwrap_err();
        assert!(matches!(err, ForgeError::ContainerTimeout { attempts: 3, .. }));
        m.assert_hits(3);
    }

    #[tokio::test]
    async fn wait_surfaces_network_error_on_last_attempt() {
        let client = ContainerClient::new_for_tests("http://127.0.0.1:9", fast_policy(2));
        let err = client.wait_for_container("todo").await.unwrap_err();
        assert!(matches!(err, ForgeError::Network { .. }));
    }
}
