//! 对外契约
//!
//! HTTP 层不在本 crate 内；这里只提供请求/响应的 serde 类型与统一响应包装。

pub mod dto;
pub mod response;

pub use response::{ApiError, ApiResponse};
