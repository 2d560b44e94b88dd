use thiserror::Error;

/// Various errors returned by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// One or more required credential fields are empty. No request was made.
    #[error("Configuration incomplete, missing: {}", .0.join(", "))]
    ConfigIncomplete(Vec<&'static str>),

    /// The refresh token could not be exchanged for an access token. The server's response
    /// body is intentionally not part of this error.
    #[error("Failed to fetch access token")]
    Auth,

    /// A Books API request came back with a non-success status.
    #[error("API call failed: {body}")]
    Api { status: u16, body: String },

    /// A user supplied value was rejected before anything was sent.
    #[error("{0}")]
    Validation(String),

    /// The background side of the message bridge is gone.
    #[error("Message bridge closed: {0}")]
    Bridge(String),

    /// Network level failure (connect, timeout, body read).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// General error message that encompasses anything else.
    #[error("{0}")]
    General(String),
}

impl ClientError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> ClientError {
        ClientError::Validation(message.into())
    }
}

impl From<String> for ClientError {
    fn from(err: String) -> ClientError {
        ClientError::General(err)
    }
}

impl From<&str> for ClientError {
    fn from(err: &str) -> ClientError {
        ClientError::General(String::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::ClientError;

    #[test]
    fn auth_message_is_fixed() {
        assert_eq!(ClientError::Auth.to_string(), "Failed to fetch access token");
    }

    #[test]
    fn api_message_keeps_body() {
        let error = ClientError::Api {
            status: 500,
            body: String::from("quota exceeded"),
        };

        assert_eq!(error.to_string(), "API call failed: quota exceeded");
    }

    #[test]
    fn config_incomplete_lists_fields() {
        let error = ClientError::ConfigIncomplete(vec!["client_id", "refresh_token"]);

        assert_eq!(
            error.to_string(),
            "Configuration incomplete, missing: client_id, refresh_token"
        );
    }
}
