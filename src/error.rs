//! 错误处理模块
//!
//! 本模块是错误处理的统一入口点，重新导出 utils::error 中的错误类型，
//! 其他模块通过 `use crate::error::*` 即可使用。
//!
//! ```rust
//! use inline_tester::error::{AppError, AppResult};
//!
//! fn open_module() -> AppResult<()> {
//!     Err(AppError::hardware_io_error("模块 470011540 未响应"))
//! }
//! assert!(open_module().is_err());
//! ```

pub use crate::utils::error::*;
