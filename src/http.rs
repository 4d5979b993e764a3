use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Thin JSON wrapper around a cookie-carrying `reqwest` client
#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, cookies: Arc<Jar>) -> Result<Self> {
        let client = Client::builder().cookie_provider(cookies).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(path, self.request(Method::GET, path)).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(path, self.request(Method::GET, path).query(query))
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(path, self.request(Method::POST, path).json(body))
            .await
    }

    /// POST, ignoring the response payload
    pub async fn post_unit<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.send_unit(path, self.request(Method::POST, path).json(body))
            .await
    }

    /// PUT, ignoring the response payload
    pub async fn put_unit<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.send_unit(path, self.request(Method::PUT, path).json(body))
            .await
    }

    /// POST without a body, ignoring the response payload
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        self.send_unit(path, self.request(Method::POST, path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send_unit(path, self.request(Method::DELETE, path)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T> {
        let response = check_status(path, request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_unit(&self, path: &str, request: RequestBuilder) -> Result<()> {
        check_status(path, request.send().await?).await?;
        Ok(())
    }
}

async fn check_status(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized {
            path: path.to_string(),
        });
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}
