use eyre::{bail, Result as EyreResult};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::HarnessError;

#[derive(Clone, Copy, Debug)]
enum RequestType {
    Get,
    Post,
    Put,
}

/// Authenticated HTTP access to one service host.
///
/// All document and token endpoints live under `https://{host}`; blob
/// transfers go to absolute, pre-signed URLs returned by the service and
/// carry no bearer token.
#[derive(Clone, Debug)]
pub struct Connection {
    host: String,
    client: Client,
    token: Option<String>,
}

impl Connection {
    pub fn new(host: String) -> Self {
        Self {
            host,
            client: Client::new(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn get<O: DeserializeOwned>(&self, path: &str) -> EyreResult<O> {
        let response = self.send(RequestType::Get, path, None::<&()>).await?;

        response.json().await.map_err(Into::into)
    }

    pub async fn post<I, O>(&self, path: &str, body: Option<&I>) -> EyreResult<O>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let response = self.send(RequestType::Post, path, body).await?;

        response.json().await.map_err(Into::into)
    }

    /// POST returning a plain-text body (the token endpoints respond with
    /// the bare credential rather than JSON).
    pub async fn post_text<I: Serialize>(&self, path: &str, body: Option<&I>) -> EyreResult<String> {
        let response = self.send(RequestType::Post, path, body).await?;

        response.text().await.map_err(Into::into)
    }

    pub async fn put<I, O>(&self, path: &str, body: &I) -> EyreResult<O>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let response = self.send(RequestType::Put, path, Some(body)).await?;

        response.json().await.map_err(Into::into)
    }

    /// PUT raw bytes to an absolute, pre-signed URL.
    pub async fn put_bytes_at(&self, url: &str, data: Vec<u8>) -> EyreResult<()> {
        let response = self.client.put(url).body(data).send().await?;

        let _response = check_status(response).await?;

        Ok(())
    }

    /// GET raw bytes from an absolute, pre-signed URL.
    pub async fn get_bytes_at(&self, url: &str) -> EyreResult<Vec<u8>> {
        let response = check_status(self.client.get(url).send().await?).await?;

        Ok(response.bytes().await?.to_vec())
    }

    async fn send<I: Serialize>(
        &self,
        req_type: RequestType,
        path: &str,
        body: Option<&I>,
    ) -> EyreResult<Response> {
        let url = format!("https://{}{}", self.host, path);

        let mut builder = match req_type {
            RequestType::Get => self.client.get(&url),
            RequestType::Post => self.client.post(&url),
            RequestType::Put => self.client.put(&url),
        };

        if let Some(body) = body {
            builder = builder.json(body);
        }

        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        check_status(builder.send().await?).await
    }
}

async fn check_status(response: Response) -> EyreResult<Response> {
    if !response.status().is_success() {
        let status = response.status().as_u16();

        bail!(HarnessError::Request {
            status,
            message: response.text().await.unwrap_or_default(),
        });
    }

    Ok(response)
}
