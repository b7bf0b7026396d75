use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::common::{Group, Session, User};
use crate::error::{ChatError, ChatResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_url: String,
}

/// REST client for the chat API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn login(&self, username: &str, password: &str) -> ChatResult<Session> {
        let response = self
            .http
            .post(self.url("/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let body: LoginResponse = check_status(response).await?.json().await?;
        Ok(Session {
            token: body.token,
            user_id: body.user_id,
        })
    }

    pub async fn signup(&self, username: &str, password: &str, name: &str) -> ChatResult<()> {
        let response = self
            .http
            .post(self.url("/signup"))
            .json(&json!({ "username": username, "password": password, "name": name }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn fetch_users(&self, session: &Session) -> ChatResult<Vec<User>> {
        let response = self
            .http
            .get(self.url("/users"))
            .bearer_auth(&session.token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn fetch_groups(&self, session: &Session) -> ChatResult<Vec<Group>> {
        let response = self
            .http
            .get(self.url("/groups"))
            .bearer_auth(&session.token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn create_group(
        &self,
        session: &Session,
        group_name: &str,
        user_ids: &[String],
    ) -> ChatResult<Value> {
        validate_group(group_name, user_ids)?;
        let response = self
            .http
            .post(self.url("/groups"))
            .bearer_auth(&session.token)
            .json(&json!({ "groupName": group_name.trim(), "userIds": user_ids }))
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Uploads a local file and returns the URL the server stored it under.
    pub async fn upload_file(&self, session: &Session, path: &Path) -> ChatResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::bytes(bytes)
            .file_name(name.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part).text("name", name);

        let response = self
            .http
            .post(self.url("/upload"))
            .bearer_auth(&session.token)
            .multipart(form)
            .send()
            .await?;
        let body: UploadResponse = check_status(response).await?.json().await?;
        Ok(body.file_url)
    }
}

pub fn validate_group(group_name: &str, user_ids: &[String]) -> ChatResult<()> {
    if group_name.trim().is_empty() {
        return Err(ChatError::Validation("Please enter a group name.".into()));
    }
    if user_ids.is_empty() {
        return Err(ChatError::Validation(
            "Please select at least one user.".into(),
        ));
    }
    Ok(())
}

async fn check_status(response: Response) -> ChatResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::FORBIDDEN {
        return Err(ChatError::Forbidden);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Status {
        status: status.as_u16(),
        body,
    })
}
