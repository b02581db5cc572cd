//! Business logic services

pub mod domains;
pub mod platform;
pub mod ssl;
pub mod system;
pub mod whm;

pub use domains::DomainService;
pub use platform::{PackageManager, Platform};
pub use ssl::{SslInspector, X509Details};
pub use system::{CommandOutcome, ServiceStatus, SystemService};
pub use whm::WhmClient;
