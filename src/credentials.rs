//! The credential record needed to talk to Zoho Books.

use crate::client_error::ClientError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

/// Environment variables read by `Credentials::from_env()`.
pub const ENV_ORGANIZATION_ID: &str = "ZOHO_ORGANIZATION_ID";
pub const ENV_CLIENT_ID: &str = "ZOHO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ZOHO_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "ZOHO_REFRESH_TOKEN";
pub const ENV_DEFAULT_CUSTOMER_ID: &str = "ZOHO_DEFAULT_CUSTOMER_ID";

/// Organization and OAuth client details used for every request.
///
/// All four string fields must be non-empty before a request is attempted, see
/// [`Credentials::ensure_complete`]. Deserializing also accepts the camelCase names used by
/// browser side configuration (`organizationId`, `clientId`, ...).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, alias = "organizationId")]
    pub organization_id: String,

    #[serde(default, alias = "clientId")]
    pub client_id: String,

    #[serde(default, alias = "clientSecret")]
    pub client_secret: String,

    #[serde(default, alias = "refreshToken")]
    pub refresh_token: String,

    /// Customer used for new invoices when none is given.
    #[serde(default, alias = "defaultCustomerId", skip_serializing_if = "Option::is_none")]
    pub default_customer_id: Option<String>,
}

/// A partial set of credential fields. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct CredentialsUpdate {
    pub organization_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub default_customer_id: Option<String>,
}

impl CredentialsUpdate {
    pub fn is_empty(&self) -> bool {
        self.organization_id.is_none()
            && self.client_id.is_none()
            && self.client_secret.is_none()
            && self.refresh_token.is_none()
            && self.default_customer_id.is_none()
    }
}

impl Credentials {
    pub fn new(
        organization_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Credentials {
        Credentials {
            organization_id: organization_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            default_customer_id: None,
        }
    }

    /// Read the credentials from `ZOHO_*` environment variables. Unset variables are left empty.
    pub fn from_env() -> Credentials {
        let var = |name: &str| env::var(name).unwrap_or_default();

        Credentials {
            organization_id: var(ENV_ORGANIZATION_ID),
            client_id: var(ENV_CLIENT_ID),
            client_secret: var(ENV_CLIENT_SECRET),
            refresh_token: var(ENV_REFRESH_TOKEN),
            default_customer_id: env::var(ENV_DEFAULT_CUSTOMER_ID)
                .ok()
                .filter(|id| !id.trim().is_empty()),
        }
    }

    /// Names of the required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("organization_id", &self.organization_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", &self.refresh_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Fail with `ClientError::ConfigIncomplete` unless every required field is set.
    pub fn ensure_complete(&self) -> Result<(), ClientError> {
        let missing = self.missing_fields();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ClientError::ConfigIncomplete(missing))
        }
    }

    /// Overwrite the fields present in `update`. An empty default customer clears it.
    pub fn merge(&mut self, update: CredentialsUpdate) {
        if let Some(organization_id) = update.organization_id {
            self.organization_id = organization_id;
        }
        if let Some(client_id) = update.client_id {
            self.client_id = client_id;
        }
        if let Some(client_secret) = update.client_secret {
            self.client_secret = client_secret;
        }
        if let Some(refresh_token) = update.refresh_token {
            self.refresh_token = refresh_token;
        }
        if let Some(customer) = update.default_customer_id {
            self.default_customer_id = Some(customer).filter(|id| !id.trim().is_empty());
        }
    }
}

/// Secrets shorter than this are masked completely.
const ABBREVIATE_MIN_LEN: usize = 24;

/// Keep only the head and tail of a long secret, e.g. `1000..f3e1`.
pub fn abbreviate(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();

    if chars.len() < ABBREVIATE_MIN_LEN {
        return "*".repeat(chars.len());
    }

    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();

    format!("{}..{}", prefix, suffix)
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("organization_id", &self.organization_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &abbreviate(&self.client_secret))
            .field("refresh_token", &abbreviate(&self.refresh_token))
            .field("default_customer_id", &self.default_customer_id)
            .finish()
    }
}
