use crate::{
    api,
    auth::{Credential, TokenSource},
    Column, Connect, Error, ResultSet, Settings, Statement, Warehouse,
};
use std::sync::Arc;

/// Client executes statements through the remote engine's HTTP API,
/// under the identity of its Credential.
#[derive(Clone)]
pub struct Client {
    // HTTP client to use for REST requests, shared across identities.
    http: reqwest::Client,
    settings: Arc<Settings>,
    tokens: Arc<TokenSource>,
}

impl Client {
    pub fn new(http: reqwest::Client, settings: Arc<Settings>, credential: Credential) -> Self {
        Self {
            http,
            settings,
            tokens: Arc::new(TokenSource::new(credential)),
        }
    }

    fn url(&self, path: &str) -> Result<url::Url, Error> {
        Ok(self.settings.host.join(path)?)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let token = self.tokens.token(&self.http, &self.settings.host).await?;
        let response = builder.bearer_auth(token).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Err(Error::Authorization(format!("{status}: {body}")))
        } else {
            Err(Error::Api { status, body })
        }
    }

    // Submit `statement` and poll it until it reaches a terminal state.
    async fn run(&self, statement: &Statement) -> Result<api::StatementResponse, Error> {
        let request = api::ExecuteRequest {
            warehouse_id: &self.settings.warehouse_id,
            statement: &statement.sql,
            parameters: &statement.parameters,
            wait_timeout: self.settings.wait_timeout_param(),
            on_wait_timeout: "CONTINUE",
            disposition: "INLINE",
            format: "JSON_ARRAY",
        };
        let builder = self
            .http
            .post(self.url("/api/2.0/sql/statements")?)
            .json(&request);

        let mut response: api::StatementResponse = self.send(builder).await?.json().await?;
        tracing::debug!(
            statement_id = %response.statement_id,
            state = %response.status.state,
            identity = self.tokens.kind(),
            "submitted statement"
        );

        while response.status.is_pending() {
            tokio::time::sleep(self.settings.poll_interval).await;

            let builder = self.http.get(self.url(&format!(
                "/api/2.0/sql/statements/{}",
                response.statement_id
            ))?);
            response = self.send(builder).await?.json().await?;

            tracing::trace!(
                statement_id = %response.statement_id,
                state = %response.status.state,
                "polled statement"
            );
        }

        if !response.status.is_succeeded() {
            let api::ServiceError {
                error_code,
                message,
            } = response.status.error.take().unwrap_or_default();

            return Err(Error::Statement {
                statement_id: response.statement_id,
                state: response.status.state,
                error_code,
                message: message.unwrap_or_else(|| "no error message".to_string()),
            });
        }
        Ok(response)
    }

    // Gather every chunk of a succeeded statement's result.
    async fn collect(&self, response: api::StatementResponse) -> Result<ResultSet, Error> {
        let api::StatementResponse {
            statement_id,
            manifest,
            result,
            ..
        } = response;

        let Some(manifest) = manifest else {
            return Err(Error::Protocol(format!(
                "statement {statement_id} succeeded without a result manifest"
            )));
        };
        let mut columns = manifest.schema.columns;
        columns.sort_by_key(|c| c.position);

        let columns: Vec<Column> = columns
            .into_iter()
            .map(|c| Column {
                name: c.name,
                type_name: c.type_name,
            })
            .collect();

        let mut rows = Vec::new();
        let mut chunk = result.unwrap_or_default();

        loop {
            for row in chunk.data_array {
                if row.len() != columns.len() {
                    return Err(Error::Protocol(format!(
                        "statement {statement_id} returned a row of {} values, but has {} columns",
                        row.len(),
                        columns.len()
                    )));
                }
                rows.push(row);
            }
            let Some(link) = chunk.next_chunk_internal_link else {
                break;
            };
            let builder = self.http.get(self.url(&link)?);
            chunk = self.send(builder).await?.json().await?;
        }
        tracing::debug!(%statement_id, rows = rows.len(), "collected statement result");

        Ok(ResultSet { columns, rows })
    }
}

#[async_trait::async_trait]
impl Warehouse for Client {
    #[tracing::instrument(level = "debug", skip_all, err)]
    async fn execute(&self, statement: &Statement) -> Result<(), Error> {
        self.run(statement).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, err)]
    async fn query(&self, statement: &Statement) -> Result<ResultSet, Error> {
        let response = self.run(statement).await?;
        self.collect(response).await
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(bytes = body.len()), err)]
    async fn upload(&self, path: &str, body: bytes::Bytes) -> Result<(), Error> {
        let mut url = self.url("/")?;
        url.set_path(&format!("/api/2.0/fs/files{path}"));
        url.query_pairs_mut().append_pair("overwrite", "true");

        let builder = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);

        self.send(builder).await?;
        Ok(())
    }
}

/// Connector builds Clients of the app identity and of delegated user
/// identities, which share an underlying HTTP connection pool.
#[derive(Clone)]
pub struct Connector {
    http: reqwest::Client,
    settings: Arc<Settings>,
    app: Arc<Client>,
}

impl Connector {
    pub fn new(settings: Settings, app: Credential) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("batchctl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let settings = Arc::new(settings);

        tracing::debug!(host = %settings.host, warehouse_id = %settings.warehouse_id, credential = ?app, "built warehouse connector");

        Ok(Self {
            app: Arc::new(Client::new(http.clone(), settings.clone(), app)),
            http,
            settings,
        })
    }
}

impl Connect for Connector {
    fn app(&self) -> Arc<dyn Warehouse> {
        self.app.clone()
    }

    fn delegated(&self, credential: Credential) -> Arc<dyn Warehouse> {
        Arc::new(Client::new(
            self.http.clone(),
            self.settings.clone(),
            credential,
        ))
    }
}
