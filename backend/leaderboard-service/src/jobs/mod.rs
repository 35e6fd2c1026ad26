//! Background jobs
//!
//! - `background_refresh`: supervised refresh runs launched by request cycles
//! - `cache_warmer`: optional periodic refresh of the whole roster

pub mod background_refresh;
pub mod cache_warmer;
