use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Postgres SQLSTATE for `unique_violation`, relayed by PostgREST in the error body.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    Header(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DbError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).map_err(|e| DbError::Header(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| DbError::Header(e.to_string()))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(classify_failure(status, error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DbError::Decode(e.to_string()))
    }

    /// `GET` a PostgREST path and decode every returned row.
    pub async fn select<T>(&self, path: &str, auth_token: Option<&str>) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<Value> = self.request(Method::GET, path, auth_token, None).await?;
        decode_rows(rows)
    }

    /// Like [`select`](Self::select) but only the first row, if any.
    pub async fn select_one<T>(&self, path: &str, auth_token: Option<&str>) -> Result<Option<T>, DbError>
    where
        T: DeserializeOwned,
    {
        Ok(self.select(path, auth_token).await?.into_iter().next())
    }

    /// Insert one row into `table` and return the stored representation.
    pub async fn insert<T>(&self, table: &str, row: Value, auth_token: Option<&str>) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        let rows: Vec<Value> = self
            .request_with_headers(Method::POST, &path, auth_token, Some(row), Some(representation()))
            .await?;

        decode_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Decode(format!("insert into {} returned no rows", table)))
    }

    /// `PATCH` every row matched by `path`, returning the updated rows.
    pub async fn update<T>(&self, path: &str, changes: Value, auth_token: Option<&str>) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<Value> = self
            .request_with_headers(Method::PATCH, path, auth_token, Some(changes), Some(representation()))
            .await?;
        decode_rows(rows)
    }

    /// `DELETE` every row matched by `path`, returning the deleted rows.
    pub async fn delete<T>(&self, path: &str, auth_token: Option<&str>) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<Value> = self
            .request_with_headers(Method::DELETE, path, auth_token, None, Some(representation()))
            .await?;
        decode_rows(rows)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, DbError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| DbError::Decode(e.to_string()))
}

fn classify_failure(status: StatusCode, error_text: String) -> DbError {
    let pg_code = serde_json::from_str::<Value>(&error_text)
        .ok()
        .and_then(|body| body.get("code").and_then(Value::as_str).map(str::to_string));

    if pg_code.as_deref() == Some(UNIQUE_VIOLATION) {
        return DbError::UniqueViolation(error_text);
    }

    match status.as_u16() {
        401 | 403 => DbError::Auth(error_text),
        404 => DbError::NotFound(error_text),
        code => DbError::Api {
            status: code,
            message: error_text,
        },
    }
}
