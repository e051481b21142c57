use serde::Deserialize;

use crate::latex_tree::Mode;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MathFieldConfig {
    /// Mode of the root sequence.
    pub default_mode: Mode,
    /// Ceiling on parser loop iterations for a single parse.
    pub max_parse_iterations: usize,
    /// Strip a parenthesized run that makes up a whole numerator or
    /// denominator of an inserted fraction.
    pub remove_extraneous_parentheses: bool,
}

impl Default for MathFieldConfig {
    fn default() -> Self {
        Self {
            default_mode: Mode::Math,
            max_parse_iterations: 10_000,
            remove_extraneous_parentheses: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_take_defaults() {
        let config: MathFieldConfig = serde_json::from_str(r#"{"defaultMode": "text"}"#).unwrap();
        assert_eq!(
            config,
            MathFieldConfig {
                default_mode: Mode::Text,
                ..MathFieldConfig::default()
            }
        );
    }
}
