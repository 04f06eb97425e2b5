//! # Configuration Module
//!
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use business_chat::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Chat tables use prefix {}", settings.chat.table_prefix);
//! ```

mod settings;

pub use settings::*;
