//! JSON mode: strict parsing, best-effort repair and the fallback policy.
//!
//! ```rust
//! use intelisys::structured::{parse_json_response, JsonRepairPolicy};
//!
//! let value = parse_json_response("{'ok': True}", false, JsonRepairPolicy::Strict).unwrap();
//! assert_eq!(value["ok"], true);
//! ```

pub mod json_mode;
pub mod repair;

pub use json_mode::{coerce_structured, parse_json_response, JsonRepairPolicy};
pub use repair::repair_parse;
