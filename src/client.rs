use crate::client_error::ClientError;
use crate::credentials::Credentials;
use crate::token_record::{RefreshTokenRequest, TokenRecord};
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Zoho accounts server that hands out access tokens.
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.zoho.com";

/// Base of every Books API endpoint.
pub const DEFAULT_BOOKS_URL: &str = "https://books.zoho.com/api/v3";

/// Default network timeout for requests, in seconds.
const DEFAULT_TIMEOUT: u64 = 10;

/// Upper bound on establishing a connection, in seconds. Kept below the request timeout so a
/// hung connect surfaces as a connect error.
const CONNECT_TIMEOUT: u64 = 5;

/// HTTP methods accepted by the Books API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_reqwest().as_str())
    }
}

impl FromStr for Method {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ClientError::validation(format!("Unsupported method: {}", s))),
        }
    }
}

/// Where requests go and how long they may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub accounts_url: String,
    pub books_url: String,
    /// Seconds.
    pub timeout: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            accounts_url: String::from(DEFAULT_ACCOUNTS_URL),
            books_url: String::from(DEFAULT_BOOKS_URL),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientOptions {
    pub fn accounts_url(mut self, url: impl Into<String>) -> Self {
        self.accounts_url = url.into();
        self
    }

    pub fn books_url(mut self, url: impl Into<String>) -> Self {
        self.books_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Authenticated access to the Zoho Books API.
///
/// Every API call exchanges the refresh token for a brand new access token first. Tokens are
/// never cached, so two calls always mean two exchanges.
pub struct Client {
    http: reqwest::Client,
    credentials: Credentials,
    options: ClientOptions,
}

impl Client {
    /// Create a new client talking to the public Zoho servers.
    pub fn with_creds(credentials: Credentials) -> Result<Client, ClientError> {
        Client::with_options(credentials, ClientOptions::default())
    }

    /// Create a new client with custom endpoints and timeout.
    pub fn with_options(
        credentials: Credentials,
        options: ClientOptions,
    ) -> Result<Client, ClientError> {
        let http = build_http(options.timeout)?;

        Ok(Client {
            http,
            credentials,
            options,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Get the timeout for requests, in seconds.
    pub fn timeout(&self) -> u64 {
        self.options.timeout
    }

    /// Set the timeout for requests, in seconds.
    pub fn set_timeout(&mut self, timeout: u64) -> Result<(), ClientError> {
        self.http = build_http(timeout)?;
        self.options.timeout = timeout;

        Ok(())
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/v2/token", self.options.accounts_url.trim_end_matches('/'))
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.options.books_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

fn build_http(timeout: u64) -> Result<reqwest::Client, ClientError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT.min(timeout)))
        .build()?;

    Ok(http)
}

impl Client {
    /// Exchange the refresh token for a short lived access token.
    ///
    /// Any failure reported by the accounts server becomes `ClientError::Auth`; the server's
    /// explanation is only logged.
    pub async fn fetch_access_token(&self) -> Result<String, ClientError> {
        self.credentials.ensure_complete()?;

        let form = RefreshTokenRequest::new(
            &self.credentials.refresh_token,
            &self.credentials.client_id,
            &self.credentials.client_secret,
        )
        .encode()?;

        let request = self
            .http
            .post(self.token_url())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form);

        let response = self.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "token exchange rejected");
            debug!(%body, "token exchange response");
            return Err(ClientError::Auth);
        }

        let record: TokenRecord = response.json().await?;

        match record.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => {
                error!(
                    reason = record.error.as_deref().unwrap_or("no access_token in response"),
                    "token exchange returned no token"
                );
                Err(ClientError::Auth)
            }
        }
    }

    /// Make an authenticated request to `<books url>/<endpoint>` and parse the JSON response.
    ///
    /// `endpoint` may carry a query string. `data`, when present, is sent as the JSON body
    /// whatever the method.
    pub async fn call_api<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<T, ClientError> {
        let token = self.fetch_access_token().await?;

        let mut request = self
            .http
            .request(method.as_reqwest(), self.api_url(endpoint))
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "application/json")
            .header("organization_id", &self.credentials.organization_id);

        if let Some(data) = data {
            request = request.body(serde_json::to_vec(data)?);
        }

        debug!(%method, endpoint, "calling Books API");

        let response = self.send(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(%status, %method, endpoint, "Books API call failed");
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        // DELETE and a few others may answer with nothing at all
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };

        Ok(serde_json::from_str(body)?)
    }

    /// Make a GET request to the Books API.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClientError> {
        self.call_api(endpoint, Method::Get, None).await
    }

    /// Make a POST request to the Books API.
    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        data: &Value,
    ) -> Result<T, ClientError> {
        self.call_api(endpoint, Method::Post, Some(data)).await
    }

    /// Make a PUT request to the Books API.
    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        data: &Value,
    ) -> Result<T, ClientError> {
        self.call_api(endpoint, Method::Put, Some(data)).await
    }

    /// Make a DELETE request to the Books API.
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClientError> {
        self.call_api(endpoint, Method::Delete, None).await
    }

    /// Send a request, trying once more if the connection could not be established. A request
    /// that reached the server is never repeated.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let retry = request.try_clone();

        match request.send().await {
            Ok(response) => Ok(response),
            Err(e) if e.is_connect() => match retry {
                Some(retry) => {
                    warn!(error = %e, "connection failed, retrying once");
                    Ok(retry.send().await?)
                }
                None => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }
}
