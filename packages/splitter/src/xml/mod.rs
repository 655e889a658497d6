//! XML helpers for the streaming engine.

pub mod namespace;

pub use namespace::{
    is_namespace_declaration, local_name, local_name_bytes, normalize_end, normalize_start,
    raw_attribute,
};
