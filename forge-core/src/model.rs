use serde::{Deserialize, Deserializer, Serialize};

// ---- Chat / LLM ----

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub available: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderList {
    pub providers: Vec<ProviderInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerateAppRequest {
    pub description: String,
    pub framework: String,
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratedApp {
    pub id: String,
    pub name: String,
    pub description: String,
    pub framework: String,
    pub provider: String,
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
}

// ---- Containers ----

/// Lifecycle phase of a sandbox as reported by the server.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerStatus {
    Initializing,
    Creating,
    Starting,
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl ContainerStatus {
    /// Lenient parse: case-insensitive, anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "initializing" => Self::Initializing,
            "creating" => Self::Creating,
            "starting" => Self::Starting,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// `Running` and `Failed` end a readiness wait.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Running | Self::Failed)
    }
}

impl<'de> Deserialize<'de> for ContainerStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        Ok(s.as_deref().map_or(Self::Unknown, Self::parse))
    }
}

impl Default for ContainerStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Client-side cached view of a sandbox.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerRecord {
    pub app_id: String,
    pub status: ContainerStatus,
    pub preview_url: Option<String>,
    pub dev_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CreateContainerRequest {
    pub app_id: String,
    pub app_description: String,
    pub framework: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CreateContainerResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub dev_url: Option<String>,
    #[serde(default)]
    pub status: ContainerStatus,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerDetail {
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ContainerStatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub pod_status: ContainerStatus,
    #[serde(default)]
    pub container_statuses: Vec<ContainerDetail>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub dev_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ContainerStatusResponse {
    pub fn not_found(app_id: &str) -> Self {
        Self {
            success: false,
            app_id: Some(app_id.to_string()),
            error: Some("Container not found".to_string()),
            ..Default::default()
        }
    }

    pub fn is_not_found(&self) -> bool {
        !self.success && self.error.as_deref() == Some("Container not found")
    }

    pub fn record(&self, app_id: &str) -> ContainerRecord {
        ContainerRecord {
            app_id: self.app_id.clone().unwrap_or_else(|| app_id.to_string()),
            status: self.pod_status,
            preview_url: self.preview_url.clone(),
            dev_url: self.dev_url.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerLogs {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub logs: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeleteContainerResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerSummary {
    pub app_id: String,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub status: ContainerStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub dev_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerList {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub containers: Vec<ContainerSummary>,
}

// ---- Apps ----

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub last_modified: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppList {
    pub apps: Vec<AppSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: f64,
    #[serde(default)]
    pub level: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Deployment {
    pub id: String,
    pub app_id: String,
    pub platform: String,
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub review_url: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogLine>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Build {
    pub id: String,
    pub app_id: String,
    pub platform: String,
    pub build_type: String,
    pub status: String,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub logs: Vec<LogLine>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub framework: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TemplateList {
    pub templates: Vec<Template>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parse_is_lenient() {
        assert_eq!(ContainerStatus::parse("Running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("creating"), ContainerStatus::Creating);
        assert_eq!(ContainerStatus::parse("CrashLoopBackOff"), ContainerStatus::Unknown);
        assert!(ContainerStatus::Failed.is_terminal());
        assert!(!ContainerStatus::Pending.is_terminal());
    }

    #[test]
    fn status_response_decodes_server_shape() {
        let v = json!({
            "success": true,
            "app_id": "todo",
            "pod_status": "Pending",
            "container_statuses": [
                {"name": "dev-environment", "ready": false, "restart_count": 0, "state": "waiting"}
            ],
            "preview_url": "https://preview-todo.example",
            "dev_url": "https://dev-todo.example"
        });
        let s: ContainerStatusResponse = serde_json::from_value(v).unwrap();
        assert_eq!(s.pod_status, ContainerStatus::Pending);
        assert_eq!(s.container_statuses.len(), 1);
        let rec = s.record("todo");
        assert_eq!(rec.status, ContainerStatus::Pending);
        assert_eq!(rec.dev_url.as_deref(), Some("https://dev-todo.example"));
    }

    #[test]
    fn null_or_missing_pod_status_is_unknown() {
        let s: ContainerStatusResponse =
            serde_json::from_value(json!({"success": true, "pod_status": null})).unwrap();
        assert_eq!(s.pod_status, ContainerStatus::Unknown);
        let s: ContainerStatusResponse = serde_json::from_value(json!({"success": false})).unwrap();
        assert_eq!(s.pod_status, ContainerStatus::Unknown);
    }

    #[test]
    fn not_found_marker() {
        let s = ContainerStatusResponse::not_found("x");
        assert!(s.is_not_found());
        assert!(!s.success);
        assert_eq!(s.app_id.as_deref(), Some("x"));
    }
}
