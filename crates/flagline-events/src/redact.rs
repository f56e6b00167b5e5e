// crates/flagline-events/src/redact.rs
// ============================================================================
// Module: Context Redaction
// Description: Serializes a context for outbound events, stripping private
//              attributes and recording what was removed.
// Purpose: Let callers mark attributes private per-context or globally
//          without those values ever reaching the control plane.
// Dependencies: flagline-core, serde_json
// ============================================================================

//! ## Overview
//! [`redact_context`] never removes the built-in fields `key`, `kind`,
//! `anonymous`, or `_meta` itself, no matter what a caller lists as
//! private: those are required for the control plane to identify the
//! context at all. Everything else named by the context's own
//! `private_attributes`, or by the pipeline-wide [`PrivacyConfig`], is
//! dropped and its canonical reference recorded in `_meta.redactedAttributes`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use flagline_core::AttributeRef;
use flagline_core::Context;
use flagline_core::SingleKindContext;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Pipeline-wide privacy settings layered on top of each context's own
/// `private_attributes`.
#[derive(Debug, Clone, Default)]
pub struct PrivacyConfig {
    /// When set, every custom attribute on every context is redacted.
    pub all_attributes_private: bool,
    /// Attribute references redacted on every context, in addition to each
    /// context's own `private_attributes`.
    pub global_private_attributes: Vec<AttributeRef>,
    /// When set, a fully anonymous context never generates an index event
    /// on first sighting.
    pub omit_anonymous_contexts: bool,
}

// ============================================================================
// SECTION: Redaction
// ============================================================================

/// Renders a context to its outbound JSON form, redacting private
/// attributes.
#[must_use]
pub fn redact_context(context: &Context, config: &PrivacyConfig) -> Value {
    match context {
        Context::Single(single) => redact_single(single, config),
        Context::Multi(parts) => {
            let mut object = Map::new();
            object.insert("kind".to_owned(), Value::String("multi".to_owned()));
            for (kind, part) in parts {
                object.insert(kind.clone(), redact_single_body(part, config));
            }
            Value::Object(object)
        }
    }
}

fn redact_single(context: &SingleKindContext, config: &PrivacyConfig) -> Value {
    let mut object = match redact_single_body(context, config) {
        Value::Object(object) => object,
        other => {
            let mut fallback = Map::new();
            fallback.insert("value".to_owned(), other);
            fallback
        }
    };
    object.insert("kind".to_owned(), Value::String(context.kind.clone()));
    Value::Object(object)
}

/// Builds the body of a single-kind context (everything but the `kind`
/// field, which a multi-kind parent attaches under its own key instead).
fn redact_single_body(context: &SingleKindContext, config: &PrivacyConfig) -> Value {
    let mut object = Map::new();
    object.insert("key".to_owned(), Value::String(context.key.clone()));
    if let Some(name) = &context.name {
        object.insert("name".to_owned(), Value::String(name.clone()));
    }
    object.insert("anonymous".to_owned(), Value::Bool(context.anonymous));

    let mut redacted = Vec::new();
    for (name, value) in &context.attributes {
        let attr = AttributeRef::Plain(name.clone());
        if is_private(&attr, context, config) {
            redacted.push(attr.to_canonical_string());
            continue;
        }
        object.insert(name.clone(), value.clone());
    }
    redacted.sort();

    if !redacted.is_empty() {
        object.insert("_meta".to_owned(), json!({ "redactedAttributes": redacted }));
    }
    Value::Object(object)
}

fn is_private(attr: &AttributeRef, context: &SingleKindContext, config: &PrivacyConfig) -> bool {
    if config.all_attributes_private {
        return true;
    }
    context.private_attributes.contains(attr) || config.global_private_attributes.contains(attr)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn redaction_preserves_builtins_and_lists_removed_names() {
        let mut attrs = BTreeMap::new();
        attrs.insert("email".to_owned(), json!("a@example.com"));
        attrs.insert("plan".to_owned(), json!("gold"));
        let mut context = SingleKindContext::new("user", "a", attrs).expect("valid");
        context.private_attributes = vec![AttributeRef::Plain("email".to_owned())];

        let redacted = redact_context(&Context::Single(context), &PrivacyConfig::default());
        assert_eq!(redacted["key"], json!("a"));
        assert_eq!(redacted["kind"], json!("user"));
        assert!(redacted.get("email").is_none());
        assert_eq!(redacted["plan"], json!("gold"));
        assert_eq!(redacted["_meta"]["redactedAttributes"], json!(["email"]));
    }

    #[test]
    fn all_attributes_private_redacts_everything_custom() {
        let mut attrs = BTreeMap::new();
        attrs.insert("email".to_owned(), json!("a@example.com"));
        let context = SingleKindContext::new("user", "a", attrs).expect("valid");
        let config = PrivacyConfig { all_attributes_private: true, ..PrivacyConfig::default() };

        let redacted = redact_context(&Context::Single(context), &config);
        assert!(redacted.get("email").is_none());
        assert_eq!(redacted["_meta"]["redactedAttributes"], json!(["email"]));
    }

    #[test]
    fn multi_kind_context_redacts_each_part_independently() {
        let mut user_attrs = BTreeMap::new();
        user_attrs.insert("email".to_owned(), json!("a@example.com"));
        let mut user = SingleKindContext::new("user", "a", user_attrs).expect("valid");
        user.private_attributes = vec![AttributeRef::Plain("email".to_owned())];
        let org = SingleKindContext::new("org", "acme", BTreeMap::new()).expect("valid");

        let context = Context::multi(vec![user, org]).expect("valid multi-kind context");
        let redacted = redact_context(&context, &PrivacyConfig::default());
        assert_eq!(redacted["kind"], json!("multi"));
        assert!(redacted["user"].get("email").is_none());
        assert_eq!(redacted["org"]["key"], json!("acme"));
    }

    #[test]
    fn no_private_attributes_omits_meta() {
        let context = SingleKindContext::new("user", "a", BTreeMap::new()).expect("valid");
        let redacted = redact_context(&Context::Single(context), &PrivacyConfig::default());
        assert!(redacted.get("_meta").is_none());
    }
}
