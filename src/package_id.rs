//! The `PackageID` contract (spec.md §3 "Package ID", §4.E) and a
//! concrete, lazily-materialising implementation for use by
//! [`crate::database::InMemoryRepository`].
//!
//! Lazy metadata keys follow spec.md §5's "one-parse-one-publish" rule:
//! each key is a [`std::sync::OnceLock`] over a `Result`, so parse
//! failure is memoised and re-raised identically on every later access
//! rather than re-attempted.

use std::sync::OnceLock;

use crate::eapi::EapiOptions;
use crate::error::CoreError;
use crate::name::{KeywordName, QualifiedPackageName, RepositoryName, SlotName, UseFlagName};
use crate::spec_tree::SpecTree;
use crate::use_req::Tribool;
use crate::version::VersionSpec;

/// The `(name, version, slot, repo)` tuple two IDs compare equal by
/// (spec.md §4.E).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    /// Qualified package name.
    pub name: QualifiedPackageName,
    /// Version.
    pub version: VersionSpec,
    /// Slot.
    pub slot: SlotName,
    /// Owning repository.
    pub repository: RepositoryName,
}

/// The core's read-only view of a candidate package (spec.md §3, §4.E).
/// Opaque capability object: the core never downcasts to a concrete
/// repository's representation.
pub trait PackageId: std::fmt::Debug {
    /// Stable identity; two IDs are equal iff their identities are equal.
    fn identity(&self) -> &PackageIdentity;
    /// The EAPI this ID was built under.
    fn eapi(&self) -> &EapiOptions;
    /// Declared IUSE (flags the package has an opinion about at all).
    fn iuse(&self) -> &[UseFlagName];
    /// Accepted KEYWORDS tokens.
    fn keywords(&self) -> &[KeywordName];
    /// Query current flag state. `Unset` iff the flag is not in [`Self::iuse`].
    fn query_use(&self, flag: &str) -> Tribool;
    /// A user- or repository-declared mask reason, if masked.
    fn mask_reason(&self) -> Option<&str>;

    /// `DEPEND` tree (build-time).
    fn depend(&self) -> Result<&SpecTree, &CoreError>;
    /// `RDEPEND` tree (run-time).
    fn rdepend(&self) -> Result<&SpecTree, &CoreError>;
    /// `PDEPEND` tree (post-merge).
    fn pdepend(&self) -> Result<&SpecTree, &CoreError>;
    /// `SDEPEND` tree (suggested/optional).
    fn sdepend(&self) -> Result<&SpecTree, &CoreError>;
    /// `LICENSE` tree.
    fn license(&self) -> Result<&SpecTree, &CoreError>;
    /// `SRC_URI` tree.
    fn src_uri(&self) -> Result<&SpecTree, &CoreError>;
    /// `PROVIDE` tree (legacy virtual-provider declarations).
    fn provide(&self) -> Result<&SpecTree, &CoreError>;
}

fn tribool_for(iuse: &[UseFlagName], enabled: &[UseFlagName], flag: &str) -> Tribool {
    if !iuse.iter().any(|f| f.as_str() == flag) {
        return Tribool::Unset;
    }
    if enabled.iter().any(|f| f.as_str() == flag) {
        Tribool::True
    } else {
        Tribool::False
    }
}

/// The raw, unparsed metadata a repository hands the core for one ID;
/// [`StoredPackageId`] memoises the parse of each tree field lazily.
#[derive(Debug, Clone)]
pub struct RawMetadata {
    /// Identity.
    pub identity: PackageIdentity,
    /// EAPI.
    pub eapi: EapiOptions,
    /// Declared IUSE.
    pub iuse: Vec<UseFlagName>,
    /// Currently enabled flags, subset of `iuse`.
    pub enabled: Vec<UseFlagName>,
    /// Accepted keywords.
    pub keywords: Vec<KeywordName>,
    /// Mask reason, if masked.
    pub mask_reason: Option<String>,
    /// Unparsed `DEPEND` text.
    pub depend: String,
    /// Unparsed `RDEPEND` text.
    pub rdepend: String,
    /// Unparsed `PDEPEND` text.
    pub pdepend: String,
    /// Unparsed `SDEPEND` text.
    pub sdepend: String,
    /// Unparsed `LICENSE` text.
    pub license: String,
    /// Unparsed `SRC_URI` text.
    pub src_uri: String,
    /// Unparsed `PROVIDE` text.
    pub provide: String,
}

/// A parse-on-first-access cell for one metadata key.
#[derive(Debug, Default)]
struct MetadataCell(OnceLock<Result<SpecTree, CoreError>>);

impl MetadataCell {
    fn get(&self, parse: impl FnOnce() -> Result<SpecTree, CoreError>) -> Result<&SpecTree, &CoreError> {
        self.0.get_or_init(parse).as_ref()
    }
}

/// A concrete, lazily-materialising [`PackageId`] built from
/// [`RawMetadata`]. Parsing of each dependency tree is deferred to first
/// access and memoised per spec.md §5.
#[derive(Debug)]
pub struct StoredPackageId {
    raw: RawMetadata,
    depend: MetadataCell,
    rdepend: MetadataCell,
    pdepend: MetadataCell,
    sdepend: MetadataCell,
    license: MetadataCell,
    src_uri: MetadataCell,
    provide: MetadataCell,
}

impl StoredPackageId {
    /// Wrap raw, unparsed metadata. No parsing happens here.
    pub fn new(raw: RawMetadata) -> Self {
        Self {
            raw,
            depend: MetadataCell::default(),
            rdepend: MetadataCell::default(),
            pdepend: MetadataCell::default(),
            sdepend: MetadataCell::default(),
            license: MetadataCell::default(),
            src_uri: MetadataCell::default(),
            provide: MetadataCell::default(),
        }
    }
}

impl PackageId for StoredPackageId {
    fn identity(&self) -> &PackageIdentity {
        &self.raw.identity
    }

    fn eapi(&self) -> &EapiOptions {
        &self.raw.eapi
    }

    fn iuse(&self) -> &[UseFlagName] {
        &self.raw.iuse
    }

    fn keywords(&self) -> &[KeywordName] {
        &self.raw.keywords
    }

    fn query_use(&self, flag: &str) -> Tribool {
        tribool_for(&self.raw.iuse, &self.raw.enabled, flag)
    }

    fn mask_reason(&self) -> Option<&str> {
        self.raw.mask_reason.as_deref()
    }

    fn depend(&self) -> Result<&SpecTree, &CoreError> {
        self.depend.get(|| {
            crate::parser::parse_tree(&self.raw.depend, crate::spec_tree::TreeKind::Dependency, &self.raw.eapi)
        })
    }

    fn rdepend(&self) -> Result<&SpecTree, &CoreError> {
        self.rdepend.get(|| {
            crate::parser::parse_tree(&self.raw.rdepend, crate::spec_tree::TreeKind::Dependency, &self.raw.eapi)
        })
    }

    fn pdepend(&self) -> Result<&SpecTree, &CoreError> {
        self.pdepend.get(|| {
            crate::parser::parse_tree(&self.raw.pdepend, crate::spec_tree::TreeKind::Dependency, &self.raw.eapi)
        })
    }

    fn sdepend(&self) -> Result<&SpecTree, &CoreError> {
        self.sdepend.get(|| {
            crate::parser::parse_tree(&self.raw.sdepend, crate::spec_tree::TreeKind::Dependency, &self.raw.eapi)
        })
    }

    fn license(&self) -> Result<&SpecTree, &CoreError> {
        self.license.get(|| {
            crate::parser::parse_tree(&self.raw.license, crate::spec_tree::TreeKind::License, &self.raw.eapi)
        })
    }

    fn src_uri(&self) -> Result<&SpecTree, &CoreError> {
        self.src_uri.get(|| {
            crate::parser::parse_tree(&self.raw.src_uri, crate::spec_tree::TreeKind::FetchableUri, &self.raw.eapi)
        })
    }

    fn provide(&self) -> Result<&SpecTree, &CoreError> {
        self.provide.get(|| {
            crate::parser::parse_tree(&self.raw.provide, crate::spec_tree::TreeKind::RestrictOrProvide, &self.raw.eapi)
        })
    }
}
