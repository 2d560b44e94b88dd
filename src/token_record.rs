use serde::{Deserialize, Serialize};

/// Wrapper around a token sent back from the Zoho accounts service.
///
/// Zoho answers some failures (such as a revoked refresh token) with a success status and an
/// `error` field instead of `access_token`, so every field is optional.
#[derive(Debug, Deserialize)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    pub api_domain: Option<String>,
    pub error: Option<String>,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
}

/// Form body of a refresh token grant.
#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'a str,
}

impl<'a> RefreshTokenRequest<'a> {
    pub fn new(refresh_token: &'a str, client_id: &'a str, client_secret: &'a str) -> Self {
        RefreshTokenRequest {
            refresh_token,
            client_id,
            client_secret,
            grant_type: "refresh_token",
        }
    }

    /// `application/x-www-form-urlencoded` encoding of the request.
    pub fn encode(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{RefreshTokenRequest, TokenRecord};

    #[test]
    fn form_body_escapes_values() {
        let body = RefreshTokenRequest::new("1000.a&b", "id", "s=cret").encode().unwrap();

        assert_eq!(
            body,
            "refresh_token=1000.a%26b&client_id=id&client_secret=s%3Dcret&grant_type=refresh_token"
        );
    }

    #[test]
    fn error_only_record() {
        let record: TokenRecord = serde_json::from_str(r#"{"error":"invalid_code"}"#).unwrap();

        assert_eq!(record.access_token, None);
        assert_eq!(record.error.as_deref(), Some("invalid_code"));
    }
}
