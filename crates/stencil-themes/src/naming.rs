//! Naming-convention case transforms

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ThemeError;

/// Identifier case kinds a theme convention can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseTransform {
    /// camelCase (e.g., loginForm)
    CamelCase,
    /// PascalCase (e.g., LoginForm)
    PascalCase,
    /// kebab-case (e.g., login-form)
    KebabCase,
    /// snake_case (e.g., login_form)
    SnakeCase,
    /// UPPER_CASE (e.g., LOGIN_FORM)
    UpperCase,
}

impl CaseTransform {
    /// All supported transforms
    pub const ALL: [CaseTransform; 5] = [
        CaseTransform::CamelCase,
        CaseTransform::PascalCase,
        CaseTransform::KebabCase,
        CaseTransform::SnakeCase,
        CaseTransform::UpperCase,
    ];

    /// Apply case transformation to a string
    pub fn apply(&self, input: &str) -> String {
        use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToShoutySnakeCase, ToSnakeCase};

        match self {
            CaseTransform::CamelCase => input.to_lower_camel_case(),
            CaseTransform::PascalCase => input.to_pascal_case(),
            CaseTransform::KebabCase => input.to_kebab_case(),
            CaseTransform::SnakeCase => input.to_snake_case(),
            CaseTransform::UpperCase => input.to_shouty_snake_case(),
        }
    }

    /// Canonical convention spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseTransform::CamelCase => "camelCase",
            CaseTransform::PascalCase => "PascalCase",
            CaseTransform::KebabCase => "kebab-case",
            CaseTransform::SnakeCase => "snake_case",
            CaseTransform::UpperCase => "UPPER_CASE",
        }
    }
}

impl FromStr for CaseTransform {
    type Err = ThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "camel" | "camelcase" | "lowercamel" | "lowercamelcase" => Ok(CaseTransform::CamelCase),
            "pascal" | "pascalcase" | "uppercamel" | "uppercamelcase" => {
                Ok(CaseTransform::PascalCase)
            }
            "kebab" | "kebabcase" => Ok(CaseTransform::KebabCase),
            "snake" | "snakecase" => Ok(CaseTransform::SnakeCase),
            "upper" | "uppercase" | "screamingsnake" | "screamingsnakecase" | "constant" => {
                Ok(CaseTransform::UpperCase)
            }
            _ => Err(ThemeError::ValidationError(format!(
                "Unknown naming convention: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for CaseTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_each_case() {
        assert_eq!(CaseTransform::CamelCase.apply("login form"), "loginForm");
        assert_eq!(CaseTransform::PascalCase.apply("login-form"), "LoginForm");
        assert_eq!(CaseTransform::KebabCase.apply("LoginForm"), "login-form");
        assert_eq!(CaseTransform::SnakeCase.apply("loginForm"), "login_form");
        assert_eq!(CaseTransform::UpperCase.apply("login form"), "LOGIN_FORM");
    }

    #[test]
    fn test_parse_convention_spellings() {
        assert_eq!(
            "camelCase".parse::<CaseTransform>().unwrap(),
            CaseTransform::CamelCase
        );
        assert_eq!(
            "PascalCase".parse::<CaseTransform>().unwrap(),
            CaseTransform::PascalCase
        );
        assert_eq!(
            "kebab-case".parse::<CaseTransform>().unwrap(),
            CaseTransform::KebabCase
        );
        assert_eq!(
            "snake_case".parse::<CaseTransform>().unwrap(),
            CaseTransform::SnakeCase
        );
        assert_eq!(
            "UPPER_CASE".parse::<CaseTransform>().unwrap(),
            CaseTransform::UpperCase
        );
        assert!("title case".parse::<CaseTransform>().is_err());
    }

    #[test]
    fn test_canonical_spelling_round_trips() {
        for case in CaseTransform::ALL {
            assert_eq!(case.as_str().parse::<CaseTransform>().unwrap(), case);
        }
    }
}
