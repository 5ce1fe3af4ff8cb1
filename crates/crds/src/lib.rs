//! gamenet CRD Definitions
//!
//! Kubernetes Custom Resource Definitions and shared network types for the
//! gamenet controllers.

pub mod constants;
pub mod dedicated_load_balancer;
pub mod elastic_ip;
pub mod game_server_set;
pub mod network_status;

pub use constants::*;
pub use dedicated_load_balancer::*;
pub use elastic_ip::*;
pub use game_server_set::*;
pub use network_status::*;
