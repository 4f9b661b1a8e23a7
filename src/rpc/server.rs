//! RPC dispatcher
//!
//! Fixed-size method table dispatched by exact string match. Requests are
//! one JSON object with required `method` and `params` fields; every failure
//! mode maps to a stable error string the host scripts match on.

use alloc::string::String;
use serde_json::{json, Value};

/// Capacity of the method table.
pub const MAX_METHODS: usize = 32;

/// Method handler: context in, params in, response object out.
pub type Handler<C> = fn(&mut C, &Value) -> Value;

struct Entry<C> {
    name: &'static str,
    handler: Handler<C>,
}

impl<C> Clone for Entry<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Entry<C> {}

/// Build the standard error response object.
pub fn error_response(message: &str) -> Value {
    json!({ "status": "error", "message": message })
}

/// Build the minimal success response object.
pub fn ok_response(message: &str) -> Value {
    json!({ "status": "ok", "message": message })
}

/// Request/response server with a fixed dispatch table.
pub struct RpcServer<C> {
    table: heapless::Vec<Entry<C>, MAX_METHODS>,
}

impl<C> RpcServer<C> {
    /// Create a server with an empty table.
    pub fn new() -> Self {
        Self {
            table: heapless::Vec::new(),
        }
    }

    /// Register a handler. Re-registering a name overwrites the existing
    /// entry; returns false only when the table is full.
    pub fn register(&mut self, name: &'static str, handler: Handler<C>) -> bool {
        if name.is_empty() {
            return false;
        }
        if let Some(entry) = self.table.iter_mut().find(|e| e.name == name) {
            entry.handler = handler;
            return true;
        }
        self.table.push(Entry { name, handler }).is_ok()
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True when no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn find(&self, name: &str) -> Option<Handler<C>> {
        self.table
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.handler)
    }

    /// Decode one request line, dispatch it, and serialize the response.
    pub fn handle(&self, ctx: &mut C, request: &str) -> String {
        let parsed: Value = match serde_json::from_str(request) {
            Ok(value) => value,
            Err(_) => return serialize(&error_response("Invalid JSON")),
        };

        let Some(obj) = parsed.as_object() else {
            return serialize(&error_response("Malformed request"));
        };
        let (Some(method), Some(params)) = (obj.get("method"), obj.get("params")) else {
            return serialize(&error_response("Malformed request"));
        };
        let Some(method) = method.as_str() else {
            return serialize(&error_response("Method must be string"));
        };

        let Some(handler) = self.find(method) else {
            return serialize(&error_response("Unknown method"));
        };

        serialize(&handler(ctx, params))
    }
}

impl<C> Default for RpcServer<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize(response: &Value) -> String {
    serde_json::to_string(response)
        .unwrap_or_else(|_| String::from(r#"{"status":"error","message":"Serialization failed"}"#))
}
