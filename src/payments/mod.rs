pub mod gateway;
pub mod signature;
pub mod webhook;

pub use gateway::{OrderRequest, PaymentGateway, ProviderOrder, RazorpayClient};
pub use signature::{compute_signature, verify_signature};
pub use webhook::{WebhookAck, WebhookReceiver};
