use serde::Serialize;
use serde_json::Value;

use crate::error::CoreResult;
use crate::http_client::HttpClient;
use crate::model::{AppList, Build, Deployment, TemplateList};
use crate::normalizer::validate_app_id;

/// Client for app records under `/api/apps`.
#[derive(Debug, Clone)]
pub struct AppsClient {
    http: HttpClient,
    base: String,
}

#[derive(Serialize)]
struct DeployReq<'a> {
    platform: &'a str,
}

#[derive(Serialize)]
struct BuildReq<'a> {
    platform: &'a str,
    build_type: &'a str,
}

#[derive(Serialize)]
struct FromTemplateReq<'a> {
    template_id: &'a str,
    name: &'a str,
    framework: &'a str,
}

impl AppsClient {
    pub fn new(http: HttpClient, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { http, base }
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str) -> Self {
        Self::new(HttpClient::new_default().unwrap(), server_base)
    }

    fn app_url(&self, app_id: &str, suffix: &str) -> CoreResult<String> {
        let id = validate_app_id(app_id)?;
        Ok(format!("{}/api/apps/{id}{suffix}", self.base))
    }

    pub async fn list_apps(&self) -> CoreResult<AppList> {
        self.http
            .get_json(&format!("{}/api/apps/list", self.base))
            .await
    }

    /// Full app record; its shape is owned by the backend, so it stays untyped.
    pub async fn get_app(&self, app_id: &str) -> CoreResult<Value> {
        self.http.get_json(&self.app_url(app_id, "")?).await
    }

    /// Merge `patch` into the stored app and return the updated record.
    pub async fn update_app(&self, app_id: &str, patch: &Value) -> CoreResult<Value> {
        self.http.put_json(&self.app_url(app_id, "")?, patch).await
    }

    pub async fn delete_app(&self, app_id: &str) -> CoreResult<Value> {
        self.http.delete_json(&self.app_url(app_id, "")?).await
    }

    pub async fn deploy_app(&self, app_id: &str, platform: &str) -> CoreResult<Deployment> {
        let url = self.app_url(app_id, "/deploy")?;
        self.http.post_json(&url, &DeployReq { platform }).await
    }

    pub async fn build_app(
        &self,
        app_id: &str,
        platform: &str,
        build_type: &str,
    ) -> CoreResult<Build> {
        let url = self.app_url(app_id, "/build")?;
        self.http
            .post_json(
                &url,
                &BuildReq {
                    platform,
                    build_type,
                },
            )
            .await
    }

    pub async fn app_analytics(&self, app_id: &str) -> CoreResult<Value> {
        self.http
            .get_json(&self.app_url(app_id, "/analytics")?)
            .await
    }

    pub async fn templates(&self) -> CoreResult<TemplateList> {
        self.http
            .get_json(&format!("{}/api/apps/templates", self.base))
            .await
    }

    pub async fn create_from_template(
        &self,
        template_id: &str,
        name: &str,
        framework: &str,
    ) -> CoreResult<Value> {
        let url = format!("{}/api/apps/create-from-template", self.base);
        self.http
            .post_json(
                &url,
                &FromTemplateReq {
                    template_id,
                    name,
                    framework,
                },
            )
            .await
    }
}
