//! Contacts and invoices on top of `Client::call_api`.

use crate::client::{Client, Method};
use crate::client_error::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

/// Label used in a summary when no date bound was given.
const ALL_TIME: &str = "All time";

/// A customer to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContact {
    pub contact_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub billing_address: Map<String, Value>,
}

impl NewContact {
    pub fn named(contact_name: impl Into<String>) -> NewContact {
        NewContact {
            contact_name: contact_name.into(),
            ..NewContact::default()
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.contact_name.trim().is_empty() {
            return Err(ClientError::validation("Customer name is required"));
        }

        Ok(())
    }
}

/// Filters for listing invoices. Field names are the Books query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Only invoices dated after this day (`YYYY-MM-DD`).
    #[serde(rename = "date_after", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    /// Only invoices dated before this day (`YYYY-MM-DD`).
    #[serde(rename = "date_before", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

impl InvoiceFilter {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub rate: f64,

    pub quantity: f64,
}

/// An invoice to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInvoice {
    pub customer_id: String,

    pub line_items: Vec<LineItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
}

impl NewInvoice {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.customer_id.trim().is_empty() {
            return Err(ClientError::validation("Customer is required"));
        }
        if self.line_items.is_empty() {
            return Err(ClientError::validation("At least one line item is required"));
        }

        Ok(())
    }
}

/// Totals over paid and unpaid invoices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub total_invoices: usize,
    pub paid_invoices: usize,
    pub unpaid_invoices: usize,
    pub total_invoice_amount: f64,
    pub total_paid_amount: f64,
    pub total_unpaid_amount: f64,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Append a query string built from `params` to `path`.
pub fn with_query<P: Serialize>(path: &str, params: &P) -> Result<String, ClientError> {
    let query = serde_urlencoded::to_string(params)?;

    if query.is_empty() {
        Ok(path.to_string())
    } else {
        Ok(format!("{}?{}", path, query))
    }
}

/// Pull `field` out of a response body.
fn take_field(mut body: Value, field: &str) -> Result<Value, ClientError> {
    match body.get_mut(field) {
        Some(value) => Ok(value.take()),
        None => Err(ClientError::General(format!(
            "Response is missing the `{}` field",
            field
        ))),
    }
}

fn take_list(body: Value, field: &str) -> Result<Vec<Value>, ClientError> {
    match take_field(body, field)? {
        Value::Array(items) => Ok(items),
        _ => Err(ClientError::General(format!("`{}` is not a list", field))),
    }
}

/// Invoice amount as a number; Books sometimes sends it as a string.
pub fn invoice_total(invoice: &Value) -> f64 {
    match invoice.get("total") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl Client {
    /// List contacts, optionally narrowed by a search term matching name or email.
    pub async fn list_contacts(&self, search: Option<&str>) -> Result<Vec<Value>, ClientError> {
        #[derive(Serialize)]
        struct Params<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            search_text: Option<&'a str>,
        }

        let endpoint = with_query("contacts", &Params { search_text: search })?;
        let body: Value = self.call_api(&endpoint, Method::Get, None).await?;

        take_list(body, "contacts")
    }

    /// Create a customer. A blank name is rejected before anything is sent.
    pub async fn create_contact(&self, contact: &NewContact) -> Result<Value, ClientError> {
        contact.validate()?;

        let data = serde_json::to_value(contact)?;
        let body: Value = self.call_api("contacts", Method::Post, Some(&data)).await?;
        let created = take_field(body, "contact")?;

        info!(name = %contact.contact_name, "created contact");

        Ok(created)
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Value>, ClientError> {
        let endpoint = with_query("invoices", filter)?;
        let body: Value = self.call_api(&endpoint, Method::Get, None).await?;

        take_list(body, "invoices")
    }

    /// Create an invoice. An empty customer falls back to the configured default customer.
    pub async fn create_invoice(&self, invoice: &NewInvoice) -> Result<Value, ClientError> {
        let mut invoice = invoice.clone();

        if invoice.customer_id.trim().is_empty() {
            if let Some(default) = &self.credentials().default_customer_id {
                invoice.customer_id = default.clone();
            }
        }

        invoice.validate()?;

        let data = serde_json::to_value(&invoice)?;
        let body: Value = self.call_api("invoices", Method::Post, Some(&data)).await?;
        let created = take_field(body, "invoice")?;

        info!(customer_id = %invoice.customer_id, "created invoice");

        Ok(created)
    }

    /// Count and total paid and unpaid invoices in the given range.
    pub async fn payment_summary(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<PaymentSummary, ClientError> {
        let range = InvoiceFilter {
            start_date: start_date.map(String::from),
            end_date: end_date.map(String::from),
            ..InvoiceFilter::default()
        };

        let paid = self.list_invoices(&range.clone().with_status("paid")).await?;
        let unpaid = self.list_invoices(&range.with_status("unpaid")).await?;

        Ok(summarize(&paid, &unpaid, start_date, end_date))
    }
}

pub fn summarize(
    paid: &[Value],
    unpaid: &[Value],
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> PaymentSummary {
    let total_paid_amount: f64 = paid.iter().map(invoice_total).sum();
    let total_unpaid_amount: f64 = unpaid.iter().map(invoice_total).sum();

    PaymentSummary {
        total_invoices: paid.len() + unpaid.len(),
        paid_invoices: paid.len(),
        unpaid_invoices: unpaid.len(),
        total_invoice_amount: total_paid_amount + total_unpaid_amount,
        total_paid_amount,
        total_unpaid_amount,
        date_range: DateRange {
            start: start_date.unwrap_or(ALL_TIME).to_string(),
            end: end_date.unwrap_or(ALL_TIME).to_string(),
        },
    }
}
