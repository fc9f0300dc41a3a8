//! Input rules handed to widgets along with the value.
//!
//! Rules are derived from the effective schema; the widget layer decides how
//! and when to display their messages.

use serde_json::Value;

use crate::options::FieldOptions;
use crate::schema::EffectiveSchema;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required { message: String },
    MinLength(u64),
    MaxLength(u64),
    Minimum(f64),
    Maximum(f64),
    MinItems(u64),
    MaxItems(u64),
}

impl Rule {
    /// Check a value. `None` is an undefined value.
    ///
    /// Only `Required` rejects empty values; the other rules pass them.
    pub fn check(&self, value: Option<&Value>) -> Result<(), String> {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Rule::Required { message } => {
                let present = match value {
                    Value::Null => false,
                    Value::String(s) => !s.is_empty(),
                    Value::Array(arr) => !arr.is_empty(),
                    _ => true,
                };
                if present {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
            Rule::MinLength(min) => match value.as_str() {
                Some(s) if (s.chars().count() as u64) < *min && !s.is_empty() => {
                    Err(format!("{} characters minimum", min))
                }
                _ => Ok(()),
            },
            Rule::MaxLength(max) => match value.as_str() {
                Some(s) if s.chars().count() as u64 > *max => {
                    Err(format!("{} characters maximum", max))
                }
                _ => Ok(()),
            },
            Rule::Minimum(min) => match value.as_f64() {
                Some(n) if n < *min => Err(format!("{} minimum", min)),
                _ => Ok(()),
            },
            Rule::Maximum(max) => match value.as_f64() {
                Some(n) if n > *max => Err(format!("{} maximum", max)),
                _ => Ok(()),
            },
            Rule::MinItems(min) => match value.as_array() {
                Some(arr) if (arr.len() as u64) < *min && !arr.is_empty() => {
                    Err(format!("{} items minimum", min))
                }
                _ => Ok(()),
            },
            Rule::MaxItems(max) => match value.as_array() {
                Some(arr) if arr.len() as u64 > *max => Err(format!("{} items maximum", max)),
                _ => Ok(()),
            },
        }
    }
}

/// Rules of a field.
pub fn field_rules(schema: &EffectiveSchema, required: bool, options: &FieldOptions) -> Vec<Rule> {
    let mut rules = Vec::new();
    if required {
        rules.push(Rule::Required {
            message: options.required_message.clone(),
        });
    }
    if let Some(n) = schema.min_length() {
        rules.push(Rule::MinLength(n));
    }
    if let Some(n) = schema.max_length() {
        rules.push(Rule::MaxLength(n));
    }
    if let Some(n) = schema.minimum() {
        rules.push(Rule::Minimum(n));
    }
    if let Some(n) = schema.maximum() {
        rules.push(Rule::Maximum(n));
    }
    if let Some(n) = schema.min_items() {
        rules.push(Rule::MinItems(n));
    }
    if let Some(n) = schema.max_items() {
        rules.push(Rule::MaxItems(n));
    }
    rules
}

/// Rules of the `oneOf` discriminator select: required when the
/// discriminator key is listed in the object's `required`.
pub fn one_of_rules(schema: &EffectiveSchema, options: &FieldOptions) -> Vec<Rule> {
    match schema.one_of_const_prop() {
        Some((key, _)) if schema.is_required_property(key) => vec![Rule::Required {
            message: options.required_message.clone(),
        }],
        _ => Vec::new(),
    }
}

/// Check every rule, collecting the messages of those that fail.
pub fn check_all(rules: &[Rule], value: Option<&Value>) -> Vec<String> {
    rules.iter().filter_map(|r| r.check(value).err()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::resolve;
    use crate::types::ModelKey;
    use serde_json::json;

    fn effective(schema: Value) -> EffectiveSchema {
        resolve(&schema, &json!({}), &ModelKey::name("v"))
    }

    #[test]
    fn required_rule_rejects_empty_values() {
        let rule = Rule::Required {
            message: "needed".into(),
        };
        assert_eq!(rule.check(None), Err("needed".to_string()));
        assert_eq!(rule.check(Some(&json!(""))), Err("needed".to_string()));
        assert_eq!(rule.check(Some(&json!([]))), Err("needed".to_string()));
        assert_eq!(rule.check(Some(&json!(0))), Ok(()));
        assert_eq!(rule.check(Some(&json!(false))), Ok(()));
    }

    #[test]
    fn length_and_bounds() {
        let rules = field_rules(
            &effective(json!({"type": "string", "minLength": 2, "maxLength": 3})),
            false,
            &FieldOptions::new(),
        );
        assert!(check_all(&rules, Some(&json!("ab"))).is_empty());
        assert_eq!(check_all(&rules, Some(&json!("a"))).len(), 1);
        assert_eq!(check_all(&rules, Some(&json!("abcd"))).len(), 1);
        assert!(check_all(&rules, None).is_empty());

        let rules = field_rules(
            &effective(json!({"type": "number", "minimum": 0, "maximum": 10})),
            false,
            &FieldOptions::new(),
        );
        assert_eq!(check_all(&rules, Some(&json!(-1))), vec!["0 minimum".to_string()]);
    }

    #[test]
    fn required_uses_configured_message() {
        let options = FieldOptions::new().required_message("Fill me");
        let rules = field_rules(&effective(json!({"type": "string"})), true, &options);
        assert_eq!(check_all(&rules, None), vec!["Fill me".to_string()]);
    }

    #[test]
    fn discriminator_select_required_when_listed() {
        let schema = effective(json!({
            "type": "object",
            "required": ["kind"],
            "oneOf": [{"properties": {"kind": {"const": "a"}}}]
        }));
        assert_eq!(one_of_rules(&schema, &FieldOptions::new()).len(), 1);

        let schema = effective(json!({
            "type": "object",
            "oneOf": [{"properties": {"kind": {"const": "a"}}}]
        }));
        assert!(one_of_rules(&schema, &FieldOptions::new()).is_empty());
    }
}
