//! scriptrun server
//!
//! Serves `POST /run`, which calls a function registered by a JavaScript file
//! in the scripts directory and returns its result. Scripts run on the Boa
//! engine; each invocation gets a fresh engine context built from the cached
//! script source.
//!
//! ```js
//! // scripts/hello.js
//! scriptrun.register('greet', function (name, times = 1) {
//!     return { message: Array(times).fill('Hello, ' + name + '!').join(' ') };
//! }, ['name:string', 'times?:integer']);
//! ```

pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod http_router;
pub mod http_server;
pub mod loader;
pub mod response;
pub mod runner;
pub mod runtime;

pub use config::{ServerConfig, DEFAULT_CACHE_CAPACITY};
pub use dispatcher::{BoundCall, CallArgs, ExportedFunction, Signature};
pub use http_router::Router;
pub use http_server::HttpServer;
pub use loader::{ModuleCache, ScriptModule};
pub use response::{InvocationOutcome, ReturnValue};
pub use runner::ScriptRunner;
pub use runtime::ScriptContext;
