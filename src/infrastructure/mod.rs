pub mod encryption;
pub mod log_redact;
pub mod logging;
pub mod rpc_client;
