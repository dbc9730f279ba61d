use crate::config::Config;
use crate::error::{Result, ScorecardError};
use crate::model::{
    Bsc, BscDraft, BoardId, Category, CategoryDraft, CategoryId, Indicator, IndicatorDraft,
    IndicatorId, Patch, Relation, RelationId,
};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

/// The remote scorecard service, one method per endpoint.
#[async_trait]
pub trait ScorecardApi: Send + Sync {
    async fn list_indicators(&self) -> Result<Vec<Indicator>>;

    async fn get_indicator(&self, id: IndicatorId) -> Result<Indicator>;

    async fn create_indicator(&self, draft: &IndicatorDraft) -> Result<Indicator>;

    /// Partial update; only the keys present in `patch` change.
    async fn patch_indicator(&self, id: IndicatorId, patch: Patch) -> Result<Indicator>;

    async fn delete_indicator(&self, id: IndicatorId) -> Result<()>;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn create_category(&self, draft: &CategoryDraft) -> Result<Category>;

    async fn patch_category(&self, id: CategoryId, patch: Patch) -> Result<Category>;

    async fn delete_category(&self, id: CategoryId) -> Result<()>;

    async fn list_boards(&self) -> Result<Vec<Bsc>>;

    async fn get_board(&self, id: BoardId) -> Result<Bsc>;

    async fn create_board(&self, draft: &BscDraft) -> Result<Bsc>;

    /// `patch` usually carries the full ordered `categorias` list.
    async fn patch_board(&self, id: BoardId, patch: Patch) -> Result<Bsc>;

    async fn delete_board(&self, id: BoardId) -> Result<()>;

    async fn create_relation(&self, parent: IndicatorId, child: IndicatorId) -> Result<Relation>;

    async fn delete_relation(&self, id: RelationId) -> Result<()>;
}

/// Bearer token holder plus the "unauthorized" signal raised on a 401.
#[derive(Debug)]
pub struct Session {
    token: RwLock<Option<String>>,
    unauthorized: watch::Sender<bool>,
}

impl Session {
    pub fn new(token: Option<String>) -> Self {
        let (unauthorized, _) = watch::channel(false);
        Session {
            token: RwLock::new(token),
            unauthorized,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
        self.unauthorized.send_replace(false);
    }

    /// Drops the token and tells every subscriber the session is gone.
    pub fn logout(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.unauthorized.send_replace(true);
    }

    /// Receiver flips to `true` when the server rejects the session.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.unauthorized.subscribe()
    }

    pub fn is_unauthorized(&self) -> bool {
        *self.unauthorized.borrow()
    }
}

/// `ScorecardApi` over HTTP with `reqwest`.
pub struct HttpApi {
    http: Client,
    base_url: String,
    session: Session,
}

impl HttpApi {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(http, config))
    }

    /// Uses a preconfigured client; the config's timeout is ignored.
    pub fn with_client(http: Client, config: &Config) -> Self {
        HttpApi {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session: Session::new(config.token.clone()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // Server routes all end in a slash.
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url().path());

        if status == StatusCode::UNAUTHORIZED {
            warn!("session rejected by server, logging out");
            self.session.logout();
            return Err(ScorecardError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScorecardError::rejected(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.execute(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn discard(&self, request: RequestBuilder) -> Result<()> {
        self.execute(request).await.map(|_| ())
    }
}

#[async_trait]
impl ScorecardApi for HttpApi {
    async fn list_indicators(&self) -> Result<Vec<Indicator>> {
        self.fetch(self.http.get(self.url("indicadores/"))).await
    }

    async fn get_indicator(&self, id: IndicatorId) -> Result<Indicator> {
        self.fetch(self.http.get(self.url(&format!("indicadores/{}/", id))))
            .await
    }

    async fn create_indicator(&self, draft: &IndicatorDraft) -> Result<Indicator> {
        self.fetch(self.http.post(self.url("indicadores/")).json(draft))
            .await
    }

    async fn patch_indicator(&self, id: IndicatorId, patch: Patch) -> Result<Indicator> {
        self.fetch(
            self.http
                .patch(self.url(&format!("indicadores/{}/", id)))
                .json(&patch),
        )
        .await
    }

    async fn delete_indicator(&self, id: IndicatorId) -> Result<()> {
        self.discard(self.http.delete(self.url(&format!("indicadores/{}/", id))))
            .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.fetch(self.http.get(self.url("categorias/"))).await
    }

    async fn create_category(&self, draft: &CategoryDraft) -> Result<Category> {
        self.fetch(self.http.post(self.url("categorias/")).json(draft))
            .await
    }

    async fn patch_category(&self, id: CategoryId, patch: Patch) -> Result<Category> {
        self.fetch(
            self.http
                .patch(self.url(&format!("categorias/{}/", id)))
                .json(&patch),
        )
        .await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<()> {
        self.discard(self.http.delete(self.url(&format!("categorias/{}/", id))))
            .await
    }

    async fn list_boards(&self) -> Result<Vec<Bsc>> {
        self.fetch(self.http.get(self.url("bsc/"))).await
    }

    async fn get_board(&self, id: BoardId) -> Result<Bsc> {
        self.fetch(self.http.get(self.url(&format!("bsc/{}/", id))))
            .await
    }

    async fn create_board(&self, draft: &BscDraft) -> Result<Bsc> {
        self.fetch(self.http.post(self.url("bsc/")).json(draft)).await
    }

    async fn patch_board(&self, id: BoardId, patch: Patch) -> Result<Bsc> {
        self.fetch(
            self.http
                .patch(self.url(&format!("bsc/{}/", id)))
                .json(&patch),
        )
        .await
    }

    async fn delete_board(&self, id: BoardId) -> Result<()> {
        self.discard(self.http.delete(self.url(&format!("bsc/{}/", id))))
            .await
    }

    async fn create_relation(&self, parent: IndicatorId, child: IndicatorId) -> Result<Relation> {
        let body = json!({ "indicador_padre": parent, "indicador_hijo": child });
        self.fetch(self.http.post(self.url("indicadores-rel/")).json(&body))
            .await
    }

    async fn delete_relation(&self, id: RelationId) -> Result<()> {
        self.discard(
            self.http
                .delete(self.url(&format!("indicadores-rel/{}/", id))),
        )
        .await
    }
}
