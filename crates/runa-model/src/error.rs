// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Failures surfaced by a model call or by model resolution.
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("missing API key: set {env}")]
    MissingApiKey { env: &'static str },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A stream ended without its terminal `Completed` event.
    #[error("model stream ended without a completed response")]
    IncompleteStream,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
