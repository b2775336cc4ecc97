use serde::{Deserialize, Serialize};

/// Enum stored as TEXT. Generates serde names, `as_str`, `ALL`,
/// `Display` and a `FromStr` that fails with a validation error.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($label:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::AppError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::error::AppError::Validation(format!(
                        "{} non valido: {}",
                        $label, other
                    ))),
                }
            }
        }
    };
}

pub(crate) use text_enum;

pub mod booking;
pub mod document;
pub mod notification;
pub mod profile;
pub mod review;
pub mod service;
pub mod user;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    /// Saturates for absurd page numbers; Postgres then returns no rows.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Trimmed text, or `None` when blank.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let p = Pagination { page: None, limit: None };
        assert_eq!((p.page(), p.limit(), p.offset()), (1, 20, 0));

        let p = Pagination {
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!((p.page(), p.limit(), p.offset()), (3, 100, 200));

        let p = Pagination {
            page: Some(-2),
            limit: Some(0),
        };
        assert_eq!((p.page(), p.limit()), (1, 1));
    }

    #[test]
    fn huge_pages_do_not_overflow() {
        let p = Pagination {
            page: Some(i64::MAX),
            limit: Some(50),
        };
        assert_eq!(p.offset(), i64::MAX);
    }

    #[test]
    fn blank_optionals_become_none() {
        assert_eq!(clean_optional(Some("  ".into())), None);
        assert_eq!(clean_optional(Some(" Milano ".into())), Some("Milano".into()));
        assert_eq!(clean_optional(None), None);
    }
}
