pub mod audit;
pub mod notification;
pub mod payment;
pub mod plan;
pub mod settlement;
pub mod subscription;
pub mod webhook_event;

pub use audit::*;
pub use notification::*;
pub use payment::*;
pub use plan::*;
pub use settlement::*;
pub use subscription::*;
pub use webhook_event::*;
