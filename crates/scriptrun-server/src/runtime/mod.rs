pub mod context;

mod bindings;
mod conversions;


pub use context::ScriptContext;
pub use conversions::{js_value_to_json, json_to_js_value};
