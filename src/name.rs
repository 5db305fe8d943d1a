//! Validated name types (spec.md §3 "Names and versions").
//!
//! Every name wraps a `String`; validation is the constructor's sole side
//! effect, matching the teacher's `PackageName` (a thin wrapper interned
//! into an arena). Character classes follow Paludis's `paludis/name.hh`.

use std::fmt;

use crate::error::CoreError;

/// Which name kind a [`CoreError::Name`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    /// `CategoryName`.
    Category,
    /// `PackageName`.
    Package,
    /// `SlotName`.
    Slot,
    /// `RepositoryName`.
    Repository,
    /// `KeywordName`.
    Keyword,
    /// `SetName`.
    Set,
    /// `UseFlagName`.
    UseFlag,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NameKind::Category => "category name",
            NameKind::Package => "package name",
            NameKind::Slot => "slot name",
            NameKind::Repository => "repository name",
            NameKind::Keyword => "keyword name",
            NameKind::Set => "set name",
            NameKind::UseFlag => "use flag name",
        };
        f.write_str(s)
    }
}

fn is_category_or_package_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-')
}

fn is_slot_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-')
}

fn is_repo_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '-')
}

fn is_keyword_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-')
}

fn is_use_flag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '@' | '-')
}

fn is_set_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-')
}

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $charset:expr, $no_leading_dash_or_dot:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Validate and construct from an owned string.
            pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
                let value = value.into();
                if value.is_empty() || !value.chars().all($charset) {
                    return Err(CoreError::Name {
                        kind: $kind,
                        value,
                    });
                }
                if $no_leading_dash_or_dot {
                    let first = value.chars().next().unwrap();
                    if first == '-' || first == '.' {
                        return Err(CoreError::Name {
                            kind: $kind,
                            value,
                        });
                    }
                }
                Ok(Self(value))
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, CoreError> {
                Self::new(s)
            }
        }
    };
}

validated_name!(
    /// A category, e.g. `dev-lang`.
    CategoryName,
    NameKind::Category,
    is_category_or_package_char,
    true
);

validated_name!(
    /// An unqualified package name, e.g. `rust`.
    PackageName,
    NameKind::Package,
    is_category_or_package_char,
    true
);

validated_name!(
    /// A slot identifier, e.g. `0` or `3.11`.
    SlotName,
    NameKind::Slot,
    is_slot_char,
    true
);

validated_name!(
    /// A repository identifier, e.g. `gentoo`. The literal `*` (meaning
    /// "any repository") is only valid inside an atom's `::*` syntax and
    /// is rejected here as a standalone name.
    RepositoryName,
    NameKind::Repository,
    is_repo_char,
    false
);

validated_name!(
    /// An architecture/stability token, e.g. `amd64` or `~amd64`.
    KeywordName,
    NameKind::Keyword,
    is_keyword_char,
    false
);

validated_name!(
    /// A package-set name, e.g. `@system`.
    SetName,
    NameKind::Set,
    is_set_char,
    true
);

validated_name!(
    /// A USE flag, e.g. `ssl`.
    UseFlagName,
    NameKind::UseFlag,
    is_use_flag_char,
    true
);

/// A fully-qualified `category/package` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedPackageName {
    /// The category component.
    pub category: CategoryName,
    /// The package component.
    pub package: PackageName,
}

impl QualifiedPackageName {
    /// Construct from validated parts.
    pub fn new(category: CategoryName, package: PackageName) -> Self {
        Self { category, package }
    }

    /// Parse `"category/package"`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (cat, pkg) = s.split_once('/').ok_or_else(|| CoreError::Name {
            kind: NameKind::Package,
            value: s.to_string(),
        })?;
        Ok(Self {
            category: CategoryName::new(cat)?,
            package: PackageName::new(pkg)?,
        })
    }
}

impl fmt::Display for QualifiedPackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_name_accepts_valid() {
        assert!(CategoryName::new("dev-lang").is_ok());
        assert!(CategoryName::new("app-misc").is_ok());
    }

    #[test]
    fn category_name_rejects_leading_dash() {
        assert!(CategoryName::new("-dev").is_err());
    }

    #[test]
    fn category_name_rejects_empty() {
        assert!(CategoryName::new("").is_err());
    }

    #[test]
    fn category_name_rejects_invalid_char() {
        assert!(CategoryName::new("dev lang").is_err());
    }

    #[test]
    fn slot_name_accepts_dotted() {
        assert!(SlotName::new("3.11").is_ok());
    }

    #[test]
    fn use_flag_allows_at_sign() {
        assert!(UseFlagName::new("python_targets_python3_11").is_ok());
        assert!(UseFlagName::new("l10n_en@US").is_ok());
    }

    #[test]
    fn repository_name_allows_standalone_but_not_star() {
        assert!(RepositoryName::new("gentoo").is_ok());
        assert!(RepositoryName::new("*").is_err());
    }

    #[test]
    fn qualified_package_name_parses() {
        let qpn = QualifiedPackageName::parse("dev-lang/rust").unwrap();
        assert_eq!(qpn.category.as_str(), "dev-lang");
        assert_eq!(qpn.package.as_str(), "rust");
        assert_eq!(qpn.to_string(), "dev-lang/rust");
    }

    #[test]
    fn qualified_package_name_rejects_missing_slash() {
        assert!(QualifiedPackageName::parse("rust").is_err());
    }
}
