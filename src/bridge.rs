//! Request/response channel between a front end and the background worker that talks to Zoho.
//!
//! Front ends send a [`Request`] and wait for exactly one [`Response`]. The background side
//! handles every request on its own task: nothing is ordered, deduplicated or cached, so two
//! identical requests in flight make two token exchanges. A front end that stops waiting simply
//! never sees its response.
//!
//! On the wire a request is a JSON object tagged by `action`:
//!
//! ```json
//! { "action": "callZohoAPI", "config": { ... }, "endpoint": "contacts", "method": "GET" }
//! { "action": "fetchAccessToken", "config": { ... } }
//! ```

use crate::client::{Client, ClientOptions, Method};
use crate::client_error::ClientError;
use crate::credentials::Credentials;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Requests waiting to be picked up by the background task.
const QUEUE_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "callZohoAPI")]
    CallZohoApi {
        config: Credentials,
        endpoint: String,
        #[serde(default)]
        method: Method,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    #[serde(rename = "fetchAccessToken")]
    FetchAccessToken { config: Credentials },
}

/// Answer to `callZohoAPI`: `{ "success": true, "data": ... }` or
/// `{ "success": false, "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiCallResponse {
    pub fn ok(data: Value) -> Self {
        ApiCallResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        ApiCallResponse {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<Value, ClientError> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(ClientError::General(self.error.unwrap_or_default()))
        }
    }
}

impl From<Result<Value, ClientError>> for ApiCallResponse {
    fn from(result: Result<Value, ClientError>) -> Self {
        match result {
            Ok(data) => ApiCallResponse::ok(data),
            Err(e) => ApiCallResponse::err(e.to_string()),
        }
    }
}

/// Answer to `fetchAccessToken`: `{ "token": "..." }` or `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenResponse {
    Token { token: String },
    Error { error: String },
}

impl TokenResponse {
    pub fn into_result(self) -> Result<String, ClientError> {
        match self {
            TokenResponse::Token { token } => Ok(token),
            TokenResponse::Error { error } => Err(ClientError::General(error)),
        }
    }
}

impl From<Result<String, ClientError>> for TokenResponse {
    fn from(result: Result<String, ClientError>) -> Self {
        match result {
            Ok(token) => TokenResponse::Token { token },
            Err(e) => TokenResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    ApiCall(ApiCallResponse),
    Token(TokenResponse),
}

/// Run one request to completion. Errors never escape; they become error responses.
pub async fn handle(options: &ClientOptions, request: Request) -> Response {
    match request {
        Request::CallZohoApi {
            config,
            endpoint,
            method,
            data,
        } => {
            debug!(%method, %endpoint, "bridge: callZohoAPI");

            let result = match Client::with_options(config, options.clone()) {
                Ok(client) => client.call_api::<Value>(&endpoint, method, data.as_ref()).await,
                Err(e) => Err(e),
            };

            Response::ApiCall(result.into())
        }
        Request::FetchAccessToken { config } => {
            debug!("bridge: fetchAccessToken");

            let result = match Client::with_options(config, options.clone()) {
                Ok(client) => client.fetch_access_token().await,
                Err(e) => Err(e),
            };

            Response::Token(result.into())
        }
    }
}

/// Parse a raw message, or build the error reply for one that can't be read.
fn parse_message(message: &str) -> Result<Request, Value> {
    serde_json::from_str::<Request>(message).map_err(|e| {
        warn!(error = %e, "bridge: unreadable message");
        json!({ "success": false, "error": format!("Invalid message: {}", e) })
    })
}

fn reply_value(response: &Response) -> Value {
    serde_json::to_value(response)
        .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }))
}

/// Handle one raw JSON message in place and produce the JSON reply.
pub async fn handle_json(options: &ClientOptions, message: &str) -> Value {
    match parse_message(message) {
        Ok(request) => reply_value(&handle(options, request).await),
        Err(reply) => reply,
    }
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Start the background worker on the current tokio runtime.
///
/// The worker runs until every `BridgeHandle` clone has been dropped.
pub fn spawn(options: ClientOptions) -> BridgeHandle {
    let (tx, mut rx) = mpsc::channel::<Envelope>(QUEUE_SIZE);

    tokio::spawn(async move {
        while let Some(Envelope { request, reply }) = rx.recv().await {
            let options = options.clone();

            tokio::spawn(async move {
                let response = handle(&options, request).await;

                if reply.send(response).is_err() {
                    debug!("bridge: requester went away, response dropped");
                }
            });
        }

        debug!("bridge: all handles dropped, stopping");
    });

    BridgeHandle { tx }
}

/// Front end side of the bridge. Cheap to clone.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BridgeHandle {
    /// Send a request and wait for its response.
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let (reply, response) = oneshot::channel();

        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| ClientError::Bridge(String::from("background worker is not running")))?;

        response
            .await
            .map_err(|_| ClientError::Bridge(String::from("request dropped without a response")))
    }

    /// Send a raw JSON message and wait for the JSON reply.
    pub async fn send_json(&self, message: &str) -> Result<Value, ClientError> {
        match parse_message(message) {
            Ok(request) => Ok(reply_value(&self.send(request).await?)),
            Err(reply) => Ok(reply),
        }
    }

    /// `callZohoAPI` round trip, unwrapped.
    pub async fn call_api(
        &self,
        config: Credentials,
        endpoint: &str,
        method: Method,
        data: Option<Value>,
    ) -> Result<Value, ClientError> {
        let request = Request::CallZohoApi {
            config,
            endpoint: endpoint.to_string(),
            method,
            data,
        };

        match self.send(request).await? {
            Response::ApiCall(response) => response.into_result(),
            Response::Token(_) => Err(ClientError::Bridge(String::from("mismatched response"))),
        }
    }

    /// `fetchAccessToken` round trip, unwrapped.
    pub async fn fetch_access_token(&self, config: Credentials) -> Result<String, ClientError> {
        match self.send(Request::FetchAccessToken { config }).await? {
            Response::Token(response) => response.into_result(),
            Response::ApiCall(_) => Err(ClientError::Bridge(String::from("mismatched response"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        handle, handle_json, spawn, ApiCallResponse, BridgeHandle, Request, Response,
        TokenResponse,
    };
    use crate::client::tests::{get_creds, get_options, mock_token, token_mock};
    use crate::client::Method;
    use crate::client_error::ClientError;
    use crate::credentials::Credentials;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    #[test]
    fn parses_front_end_message() {
        let raw = r#"{
            "action": "callZohoAPI",
            "config": {
                "organizationId": "org",
                "clientId": "id",
                "clientSecret": "secret",
                "refreshToken": "refresh"
            },
            "endpoint": "contacts"
        }"#;

        match serde_json::from_str::<Request>(raw).unwrap() {
            Request::CallZohoApi {
                config,
                endpoint,
                method,
                data,
            } => {
                assert_eq!(config, Credentials::new("org", "id", "secret", "refresh"));
                assert_eq!(endpoint, "contacts");
                assert_eq!(method, Method::Get);
                assert_eq!(data, None);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn response_shapes() {
        assert_eq!(
            serde_json::to_value(Response::ApiCall(ApiCallResponse::ok(json!([1])))).unwrap(),
            json!({"success": true, "data": [1]})
        );
        assert_eq!(
            serde_json::to_value(Response::ApiCall(ApiCallResponse::err("boom"))).unwrap(),
            json!({"success": false, "error": "boom"})
        );
        assert_eq!(
            serde_json::to_value(Response::Token(TokenResponse::Token {
                token: String::from("abc")
            }))
            .unwrap(),
            json!({"token": "abc"})
        );

        let parsed: Response = serde_json::from_value(json!({"error": "nope"})).unwrap();
        assert_eq!(
            parsed,
            Response::Token(TokenResponse::Error {
                error: String::from("nope")
            })
        );
    }

    #[tokio::test]
    async fn incomplete_config_is_reported_without_network() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/oauth/v2/token")
            .expect(0)
            .create_async()
            .await;
        let request = Request::CallZohoApi {
            config: Credentials::new("org", "id", "", "refresh"),
            endpoint: String::from("contacts"),
            method: Method::Get,
            data: None,
        };

        let response = handle(&get_options(&server), request).await;

        token.assert_async().await;
        match response {
            Response::ApiCall(ApiCallResponse {
                success: false,
                error: Some(error),
                ..
            }) => assert!(error.contains("client_secret")),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn contacts_through_the_bridge() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server, "abc").await;
        let _api = server
            .mock("GET", "/api/v3/contacts")
            .match_header("authorization", "Bearer abc")
            .match_header("organization_id", "org-123")
            .with_status(200)
            .with_body(r#"{"contacts":[{"contact_name":"X"}]}"#)
            .create_async()
            .await;
        let bridge = spawn(get_options(&server));

        let data = bridge
            .call_api(get_creds(), "contacts", Method::Get, None)
            .await
            .unwrap();

        let names: Vec<&str> = data["contacts"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["contact_name"].as_str())
            .collect();
        assert_eq!(names, vec!["X"]);
    }

    #[tokio::test]
    async fn auth_failure_through_the_bridge() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth/v2/token")
            .with_status(401)
            .create_async()
            .await;
        let bridge = spawn(get_options(&server));

        let error = bridge
            .call_api(get_creds(), "contacts", Method::Get, None)
            .await
            .unwrap_err();

        assert!(error.to_string().contains("Failed to fetch access token"));
    }

    #[tokio::test]
    async fn api_failure_through_the_bridge() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server, "abc").await;
        let _api = server
            .mock("POST", "/api/v3/invoices")
            .with_status(500)
            .with_body("quota exceeded")
            .create_async()
            .await;
        let bridge = spawn(get_options(&server));

        let response = bridge
            .send(Request::CallZohoApi {
                config: get_creds(),
                endpoint: String::from("invoices"),
                method: Method::Post,
                data: Some(json!({"customer_id": "1"})),
            })
            .await
            .unwrap();

        assert_eq!(
            response,
            Response::ApiCall(ApiCallResponse::err("API call failed: quota exceeded"))
        );
    }

    #[tokio::test]
    async fn token_through_the_bridge() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server, "abc").await;
        let bridge = spawn(get_options(&server));

        let token = bridge.fetch_access_token(get_creds()).await.unwrap();

        assert_eq!(token, "abc");
    }

    #[tokio::test]
    async fn raw_messages_through_the_bridge() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server, "abc").await;
        let _api = server
            .mock("DELETE", "/api/v3/contacts/42")
            .with_status(200)
            .with_body(r#"{"code":0,"message":"The contact has been deleted."}"#)
            .create_async()
            .await;
        let bridge = spawn(get_options(&server));
        let message = json!({
            "action": "callZohoAPI",
            "config": serde_json::to_value(get_creds()).unwrap(),
            "endpoint": "contacts/42",
            "method": "DELETE"
        })
        .to_string();

        let reply = bridge.send_json(&message).await.unwrap();
        assert_eq!(reply["success"], true);
        assert_eq!(reply["data"]["code"], 0);

        let reply = bridge.send_json("not json").await.unwrap();
        assert_eq!(reply["success"], false);
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let mut server = mockito::Server::new_async().await;
        let token = token_mock(&mut server, "abc").expect(2).create_async().await;
        let api = server
            .mock("GET", "/api/v3/contacts")
            .with_status(200)
            .with_body(r#"{"contacts":[]}"#)
            .expect(2)
            .create_async()
            .await;
        let bridge = spawn(get_options(&server));

        let (first, second) = tokio::join!(
            bridge.call_api(get_creds(), "contacts", Method::Get, None),
            bridge.call_api(get_creds(), "contacts", Method::Get, None),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        token.assert_async().await;
        api.assert_async().await;
    }

    #[tokio::test]
    async fn stopped_worker_is_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let bridge = BridgeHandle { tx };

        let error = bridge.fetch_access_token(get_creds()).await.unwrap_err();

        assert!(matches!(error, ClientError::Bridge(_)));
    }

    #[tokio::test]
    async fn unreadable_json_gets_an_error_reply() {
        let server = mockito::Server::new_async().await;

        let reply = handle_json(&get_options(&server), r#"{"action":"deleteEverything"}"#).await;

        assert_eq!(reply["success"], false);
        assert!(reply["error"].as_str().unwrap().starts_with("Invalid message"));
    }

    #[tokio::test]
    async fn json_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server, "abc").await;
        let message = json!({
            "action": "fetchAccessToken",
            "config": serde_json::to_value(get_creds()).unwrap()
        })
        .to_string();

        let reply: Value = handle_json(&get_options(&server), &message).await;

        assert_eq!(reply, json!({"token": "abc"}));
    }
}
