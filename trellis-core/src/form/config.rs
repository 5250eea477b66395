//! Form behavior switches.

use serde::{Deserialize, Serialize};

/// When a form validates fields and marks them touched.
///
/// Every switch defaults to `true`. Deserializes from camelCase keys, with
/// missing keys taking their default:
///
/// ```rust
/// use trellis_core::form::FormConfig;
///
/// let config: FormConfig =
///     serde_json::from_str(r#"{ "validateOnChange": false }"#).unwrap();
/// assert!(!config.validate_on_change);
/// assert!(config.validate_on_blur);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormConfig {
    /// Run a field's validator after each `set_value`.
    pub validate_on_change: bool,
    /// Run a field's validator on `blur`.
    pub validate_on_blur: bool,
    /// Mark a field touched on `set_value`.
    pub touch_on_change: bool,
    /// Mark every field touched when `submit` validates.
    pub touch_on_submit: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validate_on_change: true,
            validate_on_blur: true,
            touch_on_change: true,
            touch_on_submit: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_take_defaults() {
        let config: FormConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, FormConfig::default());
    }

    #[test]
    fn serializes_camel_case() {
        let config = FormConfig {
            touch_on_change: false,
            ..FormConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["touchOnChange"], json!(false));
        assert_eq!(json["validateOnBlur"], json!(true));
    }
}
