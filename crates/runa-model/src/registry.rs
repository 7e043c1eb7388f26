// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model resolution: the in-process name → model table and the process-wide
//! default provider slot.
//!
//! Wire drivers are supplied by the embedder; this module only owns the
//! lookup rules and the conventional environment configuration.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{Model, ModelError, ModelProvider};

/// Environment variable holding the default API key for wire-backed models.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable overriding the default API base URL.
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Read the conventional API key from the environment.
pub fn resolve_api_key() -> Option<String> {
    std::env::var(OPENAI_API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Read the conventional base-URL override from the environment.
pub fn resolve_base_url() -> Option<String> {
    std::env::var(OPENAI_BASE_URL_ENV).ok().filter(|u| !u.is_empty())
}

/// A name → model table with an optional default slot.
///
/// This is the canonical in-process [`ModelProvider`]: embedders register
/// the models they construct (wire-backed or mock) and agents refer to them
/// by name.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn Model>>,
    default: Option<String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: Arc<dyn Model>) {
        self.models.insert(model.name().to_string(), model);
    }

    /// Register a model and make it the default for unnamed lookups.
    pub fn register_default(&mut self, model: Arc<dyn Model>) {
        self.default = Some(model.name().to_string());
        self.register(model);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ModelProvider for ModelRegistry {
    fn get_model(&self, name: Option<&str>) -> Result<Arc<dyn Model>, ModelError> {
        let resolved = match name {
            Some(n) => n,
            None => self
                .default
                .as_deref()
                .ok_or_else(|| ModelError::UnknownModel("<default>".into()))?,
        };
        self.models
            .get(resolved)
            .cloned()
            .ok_or_else(|| ModelError::UnknownModel(resolved.to_string()))
    }
}

/// Fallback provider used when nothing else is configured.
///
/// It never resolves a model: it reports the missing API key when the
/// conventional environment is unset, and the unknown model name otherwise
/// (no wire driver is compiled into the core; embedders register real
/// models via [`set_default_model_provider`]).
struct EnvProbeProvider;

impl ModelProvider for EnvProbeProvider {
    fn get_model(&self, name: Option<&str>) -> Result<Arc<dyn Model>, ModelError> {
        if resolve_api_key().is_none() {
            return Err(ModelError::MissingApiKey { env: OPENAI_API_KEY_ENV });
        }
        Err(ModelError::UnknownModel(
            name.unwrap_or("<default>").to_string(),
        ))
    }
}

static DEFAULT_PROVIDER: Mutex<Option<Arc<dyn ModelProvider>>> = Mutex::new(None);

/// Install the process-wide default model provider.
///
/// Consulted when neither the run config nor the agent carries a provider
/// or a model instance.
pub fn set_default_model_provider(provider: Arc<dyn ModelProvider>) {
    *DEFAULT_PROVIDER.lock().expect("provider lock poisoned") = Some(provider);
}

/// The process-wide default provider; falls back to the environment probe
/// when none was installed.
pub fn default_model_provider() -> Arc<dyn ModelProvider> {
    DEFAULT_PROVIDER
        .lock()
        .expect("provider lock poisoned")
        .clone()
        .unwrap_or_else(|| Arc::new(EnvProbeProvider))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
