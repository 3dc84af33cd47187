//! Cascading lookups
//!
//! [`rules`] turns a record into request parameters; [`resolver`] walks a
//! chain of [`CascadeNode`]s, issuing one lookup per option per level.

pub mod resolver;
pub mod rules;

pub use resolver::{resolve_cascade, CascadeNode, CascadeOption, OptionSource};
pub use rules::{get_request_param_values, ExtractedParams, Formatter, ParamRule, ParamSource};
