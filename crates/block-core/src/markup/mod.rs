//! Persisted markup: the HTML-like string stored per task.

mod parse;
mod serialize;

pub use parse::{parse, parse_fragment};
pub use serialize::{serialize, serialize_nodes};
