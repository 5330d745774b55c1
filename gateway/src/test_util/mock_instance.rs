//! Canned backend-instance responses for tests.
//!
//! Wiremock servers are set up in the tests themselves; this module only
//! provides the JSON bodies a real instance would return.

use serde_json::{json, Value};

/// A successful chat completion body, as an instance would produce it.
pub fn completion_json(model: &str, content: &str) -> Value {
    json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 10,
            "completion_tokens": content.split_whitespace().count(),
            "total_tokens": 10 + content.split_whitespace().count()
        }
    })
}

/// An instance-side error body.
pub fn error_json(message: &str) -> Value {
    json!({
        "error": message
    })
}
