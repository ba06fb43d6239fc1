//! Deterministic renaming of groups and items.
//!
//! Everything here is pure: no I/O, no clocks, no shared state.

use serde_json::Value;

use crate::error::{MigrationError, Result};
use crate::kind::ResourceKind;
use crate::types::TransformOptions;

/// Apply the prefix transform to a single name.
///
/// Every literal occurrence of `remove_prefix` is stripped, then `add_prefix`
/// is prepended.
pub fn transform_name(name: &str, options: Option<&TransformOptions>) -> String {
    let Some(options) = options else {
        return name.to_string();
    };

    let stripped = strip(name, options.remove_prefix.as_deref());
    match options.add_prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}{stripped}"),
        _ => stripped,
    }
}

/// Map a source item payload to the payload written to the target.
///
/// Prefix stripping applies to every text field of `kind`; the added prefix
/// goes on the name-bearing field only. Returns the input unchanged when
/// `options` is `None`.
pub fn transform(kind: ResourceKind, payload: &Value, options: Option<&TransformOptions>) -> Value {
    let mut out = payload.clone();
    let Some(options) = options else {
        return out;
    };
    let Some(fields) = out.as_object_mut() else {
        return out;
    };

    if let Some(remove) = options.remove_prefix.as_deref().filter(|r| !r.is_empty()) {
        for field in kind.text_fields() {
            if let Some(Value::String(text)) = fields.get_mut(*field) {
                *text = text.replace(remove, "");
            }
        }
    }

    if let Some(prefix) = options.add_prefix.as_deref().filter(|p| !p.is_empty()) {
        if let Some(Value::String(name)) = fields.get_mut(kind.name_field()) {
            *name = format!("{prefix}{name}");
        }
    }

    out
}

/// Check that a source row can be written at all.
pub fn validate_item(kind: ResourceKind, payload: &Value) -> Result<()> {
    let Some(fields) = payload.as_object() else {
        return Err(MigrationError::Validation(
            "item payload is not an object".to_string(),
        ));
    };

    let name_field = kind.name_field();
    match fields.get(name_field) {
        Some(Value::String(name)) if !name.trim().is_empty() => Ok(()),
        Some(Value::String(_)) => Err(MigrationError::Validation(format!(
            "field '{name_field}' is empty"
        ))),
        Some(_) => Err(MigrationError::Validation(format!(
            "field '{name_field}' is not a string"
        ))),
        None => Err(MigrationError::Validation(format!(
            "missing required field '{name_field}'"
        ))),
    }
}

fn strip(text: &str, remove: Option<&str>) -> String {
    match remove {
        Some(remove) if !remove.is_empty() => text.replace(remove, ""),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> TransformOptions {
        TransformOptions::new()
            .with_add_prefix("A_")
            .with_remove_prefix("OLD_")
    }

    #[test]
    fn test_swap_prefix_on_name() {
        let item = json!({"id": 1, "name": "OLD_Foo"});
        let out = transform(ResourceKind::Tag, &item, Some(&options()));
        assert_eq!(out["name"], "A_Foo");
        assert_eq!(out["id"], 1);
    }

    #[test]
    fn test_no_options_is_identity() {
        let item = json!({"id": 1, "name": "OLD_Foo", "content": "x"});
        assert_eq!(transform(ResourceKind::Tag, &item, None), item);
        assert_eq!(transform_name("OLD_Foo", None), "OLD_Foo");
    }

    #[test]
    fn test_faq_strips_all_text_fields_but_prefixes_question_only() {
        let item = json!({
            "question": "OLD_How do I OLD_reset?",
            "content": "See OLD_docs",
            "answer": "OLD_untouched"
        });
        let out = transform(ResourceKind::Faq, &item, Some(&options()));

        assert_eq!(out["question"], "A_How do I reset?");
        assert_eq!(out["content"], "See docs");
        assert_eq!(out["answer"], "OLD_untouched");
    }

    #[test]
    fn test_empty_prefixes_change_nothing() {
        let item = json!({"name": "Foo"});
        let opts = TransformOptions::new().with_add_prefix("").with_remove_prefix("");
        assert_eq!(transform(ResourceKind::Voice, &item, Some(&opts)), item);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let item = json!({"name": "OLD_Bar", "content": "OLD_"});
        let a = transform(ResourceKind::Tag, &item, Some(&options()));
        let b = transform(ResourceKind::Tag, &item, Some(&options()));
        assert_eq!(a, b);
        assert_eq!(transform_name("OLD_Bar", Some(&options())), "A_Bar");
    }

    #[test]
    fn test_validate_item() {
        assert!(validate_item(ResourceKind::Tag, &json!({"name": "ok"})).is_ok());
        assert!(validate_item(ResourceKind::Tag, &json!({"name": "  "})).is_err());
        assert!(validate_item(ResourceKind::Faq, &json!({"name": "no question"})).is_err());
        assert!(validate_item(ResourceKind::Tag, &json!({"name": 3})).is_err());
        assert!(validate_item(ResourceKind::Tag, &json!([1, 2])).is_err());
    }
}
