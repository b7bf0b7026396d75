use chrono::{DateTime, Utc};

use crate::common::{Group, Session, User};
use crate::error::{ChatError, ChatResult};
use crate::storage::SessionStore;

use super::client::ApiClient;

/// REST calls bound to the locally cached session.
pub struct Account {
    api: ApiClient,
    store: SessionStore,
}

impl Account {
    pub fn new(api: ApiClient, store: SessionStore) -> Self {
        Self { api, store }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> ChatResult<Session> {
        self.store.load()?.ok_or(ChatError::NotLoggedIn)
    }

    pub fn logged_in_at(&self) -> ChatResult<Option<DateTime<Utc>>> {
        Ok(self.store.logged_in_at()?)
    }

    pub async fn login(&self, username: &str, password: &str) -> ChatResult<Session> {
        let session = self.api.login(username, password).await?;
        self.store.save(&session)?;
        log::info!("Logged in as {}", session.user_id);
        Ok(session)
    }

    pub async fn signup(&self, username: &str, password: &str, name: &str) -> ChatResult<()> {
        self.api.signup(username, password, name).await
    }

    pub fn logout(&self) -> ChatResult<()> {
        self.store.clear()?;
        log::info!("Session cleared");
        Ok(())
    }

    pub async fn users(&self) -> ChatResult<Vec<User>> {
        let session = self.session()?;
        let result = self.api.fetch_users(&session).await;
        self.logout_on_forbidden(result)
    }

    pub async fn groups(&self) -> ChatResult<Vec<Group>> {
        let session = self.session()?;
        let result = self.api.fetch_groups(&session).await;
        self.logout_on_forbidden(result)
    }

    pub async fn create_group(&self, group_name: &str, user_ids: &[String]) -> ChatResult<()> {
        let session = self.session()?;
        let created = self.api.create_group(&session, group_name, user_ids).await?;
        log::debug!("Group created: {created}");
        Ok(())
    }

    fn logout_on_forbidden<T>(&self, result: ChatResult<T>) -> ChatResult<T> {
        if let Err(ChatError::Forbidden) = &result {
            log::warn!("Server rejected the cached token; logging out");
            if let Err(err) = self.logout() {
                log::error!("Failed to clear session: {err}");
            }
        }
        result
    }
}
