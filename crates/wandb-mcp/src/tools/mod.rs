//! MCP tool parameter and response types.
//!
//! All parameter structs derive `Deserialize + JsonSchema` for MCP tool registration.
//! Conversions into the `wandb_client` request types live next to each struct.

pub mod helpers;
pub mod params;

pub use helpers::*;
pub use params::*;
