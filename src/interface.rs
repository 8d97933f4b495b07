/// This module contains structs that are returned by the HTTP endpoints.
/// They are serialized as JSON objects to be received by the browser UI and the caption client.
/// The names of the fields become the JSON keys, so renaming them is a breaking change for clients.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CaptionResponse
{
    pub caption: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ErrorResponse
{
    pub error: String,
}

/// Returned by the health check; reports what the loaded vocabulary and decoder look like.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HealthResponse
{
    pub status: String,
    pub vocabulary_size: usize,
    pub max_len: usize,
}
