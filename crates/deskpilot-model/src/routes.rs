// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Provider routing table: static metadata for every endpoint the unified
//! client can reach.  This is the single source of truth for provider ids,
//! base URLs, and credential environment variables — construction logic
//! lives in [`crate::HttpCompletionClient`].

/// Metadata describing one provider route.
#[derive(Debug, Clone)]
pub struct ProviderRoute {
    /// Prefix used in model identifiers, e.g. `"anthropic"` in
    /// `"anthropic/claude-sonnet-4"`.
    pub id: &'static str,
    /// Human-readable display name.
    pub name: &'static str,
    /// OpenAI-compatible API base, ending before `/chat/completions`.
    pub base_url: &'static str,
    /// Environment variable that holds the API key.  `None` for local
    /// servers that need no key.
    pub api_key_env: Option<&'static str>,
    pub requires_api_key: bool,
}

/// Complete routing table, in declaration order.
pub static ROUTES: &[ProviderRoute] = &[
    ProviderRoute {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
        api_key_env: Some("OPENAI_API_KEY"),
        requires_api_key: true,
    },
    ProviderRoute {
        id: "anthropic",
        name: "Anthropic",
        base_url: "https://api.anthropic.com/v1",
        api_key_env: Some("ANTHROPIC_API_KEY"),
        requires_api_key: true,
    },
    ProviderRoute {
        id: "gemini",
        name: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        api_key_env: Some("GEMINI_API_KEY"),
        requires_api_key: true,
    },
    ProviderRoute {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        api_key_env: Some("OPENROUTER_API_KEY"),
        requires_api_key: true,
    },
    ProviderRoute {
        id: "dashscope",
        name: "Qwen/DashScope",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        api_key_env: Some("DASHSCOPE_API_KEY"),
        requires_api_key: true,
    },
    ProviderRoute {
        id: "huggingface",
        name: "Hugging Face",
        base_url: "https://router.huggingface.co/v1",
        api_key_env: Some("HF_API_KEY"),
        requires_api_key: true,
    },
    ProviderRoute {
        id: "moonshot",
        name: "Moonshot AI",
        base_url: "https://api.moonshot.cn/v1",
        api_key_env: Some("MOONSHOT_API_KEY"),
        requires_api_key: true,
    },
    // ── Local / OSS ───────────────────────────────────────────────────────────
    ProviderRoute {
        id: "ollama",
        name: "Ollama",
        base_url: "http://localhost:11434/v1",
        api_key_env: None,
        requires_api_key: false,
    },
    ProviderRoute {
        id: "vllm",
        name: "vLLM",
        base_url: "http://localhost:8000/v1",
        api_key_env: None,
        requires_api_key: false,
    },
    ProviderRoute {
        id: "lmstudio",
        name: "LM Studio",
        base_url: "http://localhost:1234/v1",
        api_key_env: None,
        requires_api_key: false,
    },
];

/// Look up a route by provider id.
pub fn lookup_route(id: &str) -> Option<&'static ProviderRoute> {
    ROUTES.iter().find(|r| r.id == id)
}

/// Split a model identifier into its route and the bare model id the
/// provider expects.
///
/// `"anthropic/claude-sonnet-4"` → (anthropic route, `"claude-sonnet-4"`).
/// Identifiers without a known provider prefix fall back to the OpenAI
/// route with the full string, so OpenAI-compatible gateways keep working
/// without registration.
pub fn split_model(model: &str) -> (&'static ProviderRoute, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        if let Some(route) = lookup_route(prefix) {
            return (route, rest);
        }
    }
    (lookup_route("openai").expect("openai route registered"), model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_route_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for r in ROUTES {
            assert!(seen.insert(r.id), "duplicate route id: {}", r.id);
        }
    }

    #[test]
    fn split_model_extracts_known_prefix() {
        let (route, bare) = split_model("anthropic/claude-sonnet-4");
        assert_eq!(route.id, "anthropic");
        assert_eq!(bare, "claude-sonnet-4");
    }

    #[test]
    fn split_model_keeps_unknown_prefix_in_model_id() {
        let (route, bare) = split_model("huggingface/ByteDance-Seed/UI-TARS-1.5-7B");
        assert_eq!(route.id, "huggingface");
        assert_eq!(bare, "ByteDance-Seed/UI-TARS-1.5-7B");
    }

    #[test]
    fn split_model_defaults_to_openai() {
        let (route, bare) = split_model("computer-use-preview");
        assert_eq!(route.id, "openai");
        assert_eq!(bare, "computer-use-preview");
    }

    #[test]
    fn local_routes_need_no_key() {
        for id in ["ollama", "vllm", "lmstudio"] {
            let r = lookup_route(id).unwrap();
            assert!(!r.requires_api_key, "{id} must not require a key");
        }
    }
}
