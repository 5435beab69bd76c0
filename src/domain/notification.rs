use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job handed to the notification dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationJob {
    #[serde(rename = "WHATSAPP_ACCESS_CODE")]
    WhatsAppAccessCode(AccessCodeNotice),
    #[serde(rename = "WHATSAPP_INVOICE")]
    WhatsAppInvoice(InvoiceNotice),
}

impl NotificationJob {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationJob::WhatsAppAccessCode(_) => "WHATSAPP_ACCESS_CODE",
            NotificationJob::WhatsAppInvoice(_) => "WHATSAPP_INVOICE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessCodeNotice {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub gym_id: Uuid,
    pub gym_name: String,
    pub plan_name: String,
    pub access_code: String,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceNotice {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_url: String,
}

/// Request to the invoice collaborator, queued after activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceJob {
    pub subscription_id: Uuid,
    pub payment_id: Uuid,
}

/// Fields the invoice renderer needs; it answers with a document URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub access_code: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub payment_id: Uuid,
    pub provider_payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub paid_at: DateTime<Utc>,
    pub gym_id: Uuid,
    pub gym_name: String,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub plan_duration: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_shape() {
        let job = NotificationJob::WhatsAppInvoice(InvoiceNotice {
            user_id: Uuid::nil(),
            subscription_id: Uuid::nil(),
            payment_id: Uuid::nil(),
            invoice_url: "https://invoices.example/1.pdf".to_string(),
        });

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "WHATSAPP_INVOICE");
        assert_eq!(value["payload"]["invoice_url"], "https://invoices.example/1.pdf");

        let back: NotificationJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
