pub mod metrics;
pub mod razorpay;
pub mod repository;
pub mod zoho;

pub use metrics::{get_metrics, init_metrics};
pub use razorpay::RazorpayClient;
pub use repository::DonationRepository;
pub use zoho::ZohoClient;
