//! # zoho-books
//!
//! Library to manage Zoho Books contacts and invoices.
//!
//! Requests are authenticated with an OAuth refresh token: every call first exchanges the
//! refresh token for a fresh access token, then sends the request with that bearer token and
//! the organization id header.
//!
//! You can read more about the Zoho Books API here:
//! [https://www.zoho.com/books/api/v3/](https://www.zoho.com/books/api/v3/)
//!
//! ### Example
//!
//! ```no_run
//! use zoho_books::{Client, Credentials};
//!
//! # async fn run() -> Result<(), zoho_books::ClientError> {
//! let credentials = Credentials::new(
//!     "YOUR_ORGANIZATION_ID",
//!     "YOUR_CLIENT_ID",
//!     "YOUR_CLIENT_SECRET",
//!     "YOUR_REFRESH_TOKEN",
//! );
//!
//! let client = Client::with_creds(credentials)?;
//!
//! for contact in client.list_contacts(None).await? {
//!     println!("{}", contact["contact_name"]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Front ends that should not hold a client themselves can go through the [`bridge`], which
//! runs requests on a background task and answers each one exactly once.

pub mod books;
pub mod bridge;
mod client;
mod client_error;
pub mod credentials;
pub mod export;
pub mod store;
mod token_record;

pub use books::{InvoiceFilter, LineItem, NewContact, NewInvoice, PaymentSummary};
pub use client::{Client, ClientOptions, Method, DEFAULT_ACCOUNTS_URL, DEFAULT_BOOKS_URL};
pub use client_error::ClientError;
pub use credentials::{Credentials, CredentialsUpdate};
pub use export::ExportFormat;
pub use store::{CredentialStore, FileStore, MemoryStore};
pub use token_record::{RefreshTokenRequest, TokenRecord};
