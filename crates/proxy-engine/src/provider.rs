/// Infers a provider short name from a model name's prefix or substring,
/// matching the same priority order the Proxy Engine's provider resolution
/// falls back to when no explicit header or query parameter is given.
pub fn provider_from_model(model: &str) -> Option<&'static str> {
    let model = model.to_lowercase();
    if model.starts_with("gpt") || model.contains("openai") {
        return Some("openai");
    }
    if model.starts_with("qwen") || model.contains("tongyi") {
        return Some("tongyi");
    }
    if model.starts_with("gemini") || model.contains("google") {
        return Some("google");
    }
    if model.contains("claude") || model.contains("anthropic") {
        return Some("anthropic");
    }
    None
}

/// Resolves the provider short name: explicit header, then query
/// parameter, then the request body's `model` field.
pub fn resolve_provider(
    header_provider: Option<&str>,
    query_provider: Option<&str>,
    body_model: Option<&str>,
) -> Option<String> {
    if let Some(p) = header_provider.map(str::trim).filter(|p| !p.is_empty()) {
        return Some(p.to_lowercase());
    }
    if let Some(p) = query_provider.map(str::trim).filter(|p| !p.is_empty()) {
        return Some(p.to_lowercase());
    }
    body_model.and_then(provider_from_model).map(str::to_string)
}

/// Per-provider default upstream root, used only when the provider's
/// decrypted credentials carry no `openai_api_base` override.
pub fn default_upstream_base(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com"),
        "tongyi" => Some("https://dashscope.aliyuncs.com/compatible-mode"),
        "google" => Some("https://generativelanguage.googleapis.com"),
        "anthropic" => Some("https://api.anthropic.com"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_prefix_resolves_known_providers() {
        assert_eq!(provider_from_model("gpt-4o"), Some("openai"));
        assert_eq!(provider_from_model("qwen-max"), Some("tongyi"));
        assert_eq!(provider_from_model("gemini-1.5-flash"), Some("google"));
        assert_eq!(provider_from_model("claude-3-5-sonnet"), Some("anthropic"));
        assert_eq!(provider_from_model("unknown-model"), None);
    }

    #[test]
    fn header_takes_priority_over_query_and_body() {
        let resolved = resolve_provider(Some("Anthropic"), Some("openai"), Some("gpt-4o"));
        assert_eq!(resolved.as_deref(), Some("anthropic"));
    }

    #[test]
    fn falls_back_to_body_model_prefix() {
        let resolved = resolve_provider(None, None, Some("qwen-plus"));
        assert_eq!(resolved.as_deref(), Some("tongyi"));
    }

    #[test]
    fn resolves_none_when_nothing_matches() {
        assert!(resolve_provider(None, None, Some("unknown")).is_none());
    }
}
