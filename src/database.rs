//! Query & selection (spec.md §4.F) and the external interfaces of §6
//! (`Environment`, `PackageDatabase`, `Repository`), plus an in-memory
//! test double for each — grounded on the teacher's `repository.rs`,
//! which likewise ships only a `HashMap`-backed `InMemoryRepository`,
//! never a real portage-tree reader.

use std::collections::HashMap;
use std::rc::Rc;

use crate::atom::PackageDepSpec;
use crate::error::CoreError;
use crate::name::{NameKind, QualifiedPackageName, RepositoryName};
use crate::package_id::PackageId;
use crate::spec_tree::SpecNode;
use crate::use_req::Tribool;
use crate::version::version_matches;

/// Visibility constraint on candidates (spec.md §4.F "visible", "installed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// No visibility constraint beyond mask/keyword/license.
    Any,
    /// Candidate must not be masked and must pass keyword/license acceptance.
    VisibleOnly,
    /// Candidate must come from an installed-package repository.
    InstalledOnly,
}

/// How many results to return, and in what shape (spec.md §4.F
/// "all-versions", "best-version").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Return every match, sorted by selection order.
    All,
    /// Return only the first match in selection order.
    Best,
}

/// One `query()` call's full option set (spec.md §4.F, §6 `PackageDatabase::query`).
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Visibility constraint.
    pub visibility: Visibility,
    /// Restrict candidates to one named repository (spec.md §4.F "by-repo").
    pub repo: Option<RepositoryName>,
    /// How many results, and in what order.
    pub selection: Selection,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            visibility: Visibility::VisibleOnly,
            repo: None,
            selection: Selection::All,
        }
    }
}

/// The capability object the resolver consults for policy decisions
/// (spec.md §6 `Environment`).
pub trait Environment {
    /// `true` iff at least one of `keywords` is accepted.
    fn accept_keywords(&self, keywords: &[crate::name::KeywordName], id: &dyn PackageId) -> bool;
    /// `true` iff the named license literal is accepted for `id`.
    fn accept_license(&self, literal: &str, id: &dyn PackageId) -> bool;
    /// The environment's own opinion of a flag, independent of `id`'s IUSE
    /// defaults (used to decide an ID's *effective* USE during resolve).
    fn query_use(&self, flag: &str, id: &dyn PackageId) -> bool;
    /// A user-declared mask reason, if any.
    fn mask_for_user(&self, id: &dyn PackageId) -> Option<String>;
    /// A repository- or profile-declared "breaks the system" mask reason.
    fn mask_for_breakage(&self, id: &dyn PackageId) -> Option<String>;
    /// Mirror URLs registered under `mirror_name`.
    fn mirrors(&self, mirror_name: &str) -> Vec<String>;
}

/// A source of [`PackageId`]s (spec.md §6 `Repository`).
pub trait Repository {
    /// This repository's name.
    fn name(&self) -> &RepositoryName;
    /// Selection priority; higher sorts first (spec.md §4.F "selection order").
    fn priority(&self) -> i32;
    /// `true` for the pseudo-repository holding already-installed IDs.
    fn is_installed_repo(&self) -> bool {
        false
    }
    /// Every qualified name this repository has at least one version of.
    fn all_packages(&self) -> Vec<QualifiedPackageName>;
    /// Every version of `name` this repository carries.
    fn versions_for(&self, name: &QualifiedPackageName) -> Vec<Rc<dyn PackageId>>;
}

/// The resolver's view of a package database (spec.md §6 `PackageDatabase`).
pub trait PackageDatabase {
    /// Registered repositories, in stable priority order.
    fn repositories(&self) -> &[Rc<dyn Repository>];

    /// Resolve an unqualified package-name fragment to exactly one
    /// qualified name, or fail with [`CoreError::AmbiguousPackageName`].
    fn fetch_unique_qualified_package_name(&self, part: &str) -> Result<QualifiedPackageName, CoreError> {
        let mut matches = Vec::new();
        for repo in self.repositories() {
            for name in repo.all_packages() {
                if name.package.as_str() == part && !matches.contains(&name) {
                    matches.push(name);
                }
            }
        }
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(CoreError::Name {
                kind: NameKind::Package,
                value: part.to_string(),
            }),
            _ => Err(CoreError::AmbiguousPackageName {
                part: part.to_string(),
                matches: matches.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }

    /// Run a selection query (spec.md §4.F steps 1–5).
    fn query(
        &self,
        spec: &PackageDepSpec,
        opts: &QueryOptions,
        env: &dyn Environment,
        requesting: Option<&dyn PackageId>,
    ) -> Result<Vec<Rc<dyn PackageId>>, CoreError> {
        let mut candidates: Vec<(i32, Rc<dyn Repository>, Rc<dyn PackageId>)> = Vec::new();
        for repo in self.repositories() {
            if let Some(want) = &opts.repo {
                if repo.name() != want {
                    continue;
                }
            }
            if opts.visibility == Visibility::InstalledOnly && !repo.is_installed_repo() {
                continue;
            }
            for id in repo.versions_for(&spec.name) {
                if atom_matches(spec, id.as_ref()) {
                    candidates.push((repo.priority(), repo.clone(), id));
                }
            }
        }

        let mut filtered = Vec::new();
        for (priority, repo, id) in candidates {
            if opts.visibility == Visibility::VisibleOnly && !repo.is_installed_repo() {
                if env.mask_for_user(id.as_ref()).is_some() || env.mask_for_breakage(id.as_ref()).is_some() {
                    continue;
                }
                if !env.accept_keywords(id.keywords(), id.as_ref()) {
                    continue;
                }
                if !license_accepted(id.as_ref(), env)? {
                    continue;
                }
            }
            if !use_requirements_satisfied(spec, id.as_ref(), requesting)? {
                continue;
            }
            filtered.push((priority, repo.name().clone(), id));
        }

        filtered.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.2.identity().version.cmp(&a.2.identity().version))
                .then_with(|| a.1.as_str().cmp(b.1.as_str()))
        });

        let ids = filtered.into_iter().map(|(_, _, id)| id).collect::<Vec<_>>();
        Ok(match opts.selection {
            Selection::All => ids,
            Selection::Best => ids.into_iter().take(1).collect(),
        })
    }
}

fn atom_matches(spec: &PackageDepSpec, id: &dyn PackageId) -> bool {
    let identity = id.identity();
    if identity.name != spec.name {
        return false;
    }
    if let Some(slot) = &spec.slot.slot {
        if !spec.slot.any_slot && identity.slot != *slot {
            return false;
        }
    }
    if let Some(repo) = &spec.repo {
        if identity.repository != *repo {
            return false;
        }
    }
    if let (Some(op), Some(version)) = (spec.effective_operator(), &spec.version) {
        if !version_matches(&identity.version, op, version) {
            return false;
        }
    }
    true
}

fn use_requirements_satisfied(
    spec: &PackageDepSpec,
    id: &dyn PackageId,
    requesting: Option<&dyn PackageId>,
) -> Result<bool, CoreError> {
    for req in &spec.use_requirements {
        let candidate_query = |flag: &str| id.query_use(flag);
        let mine_query = requesting.map(|r| move |flag: &str| r.query_use(flag));
        let label = id.identity().name.to_string();
        if !req.evaluate(candidate_query, mine_query, &label)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `true` iff every literal reachable (under `id`'s current USE) in the
/// license tree is accepted by `env` (spec.md §4.F step 4).
fn license_accepted(id: &dyn PackageId, env: &dyn Environment) -> Result<bool, CoreError> {
    let tree = match id.license() {
        Ok(t) => t,
        Err(e) => return Err(e.clone()),
    };
    Ok(license_node_satisfied(tree.root(), id, env))
}

fn license_node_satisfied(node: &SpecNode, id: &dyn PackageId, env: &dyn Environment) -> bool {
    match node {
        SpecNode::AllOf(children) => children.iter().all(|c| license_node_satisfied(c, id, env)),
        SpecNode::AnyOf(children) => {
            children.is_empty() || children.iter().any(|c| license_node_satisfied(c, id, env))
        }
        SpecNode::UseConditional { flag, negated, children } => {
            let enabled = matches!(id.query_use(flag.as_str()), Tribool::True);
            if *negated != enabled {
                children.iter().all(|c| license_node_satisfied(c, id, env))
            } else {
                true
            }
        }
        SpecNode::License(text) => env.accept_license(text, id),
        _ => true,
    }
}

/// An in-memory [`Repository`], for tests and demos — never a real
/// portage-tree reader (that is out of scope per spec.md §1).
pub struct InMemoryRepository {
    name: RepositoryName,
    priority: i32,
    installed: bool,
    packages: HashMap<QualifiedPackageName, Vec<Rc<dyn PackageId>>>,
}

impl InMemoryRepository {
    /// An empty repository named `name` with the given selection priority.
    pub fn new(name: RepositoryName, priority: i32) -> Self {
        Self {
            name,
            priority,
            installed: false,
            packages: HashMap::new(),
        }
    }

    /// Mark this repository as the installed-package pseudo-repository.
    pub fn as_installed(mut self) -> Self {
        self.installed = true;
        self
    }

    /// Add one ID to the repository's holdings.
    pub fn insert(&mut self, id: Rc<dyn PackageId>) {
        self.packages.entry(id.identity().name.clone()).or_default().push(id);
    }
}

impl Repository for InMemoryRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_installed_repo(&self) -> bool {
        self.installed
    }

    fn all_packages(&self) -> Vec<QualifiedPackageName> {
        self.packages.keys().cloned().collect()
    }

    fn versions_for(&self, name: &QualifiedPackageName) -> Vec<Rc<dyn PackageId>> {
        self.packages.get(name).cloned().unwrap_or_default()
    }
}

/// An in-memory [`PackageDatabase`] over a fixed repository list.
pub struct InMemoryDatabase {
    repos: Vec<Rc<dyn Repository>>,
}

impl InMemoryDatabase {
    /// Build a database from repositories in descending-priority order.
    pub fn new(repos: Vec<Rc<dyn Repository>>) -> Self {
        Self { repos }
    }
}

impl PackageDatabase for InMemoryDatabase {
    fn repositories(&self) -> &[Rc<dyn Repository>] {
        &self.repos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::parse_atom;
    use crate::eapi::EapiOptions;
    use crate::name::{KeywordName, SlotName, UseFlagName};
    use crate::package_id::{PackageIdentity, RawMetadata, StoredPackageId};
    use crate::version::VersionSpec;

    struct PermissiveEnv;

    impl Environment for PermissiveEnv {
        fn accept_keywords(&self, keywords: &[KeywordName], _id: &dyn PackageId) -> bool {
            !keywords.is_empty()
        }
        fn accept_license(&self, _literal: &str, _id: &dyn PackageId) -> bool {
            true
        }
        fn query_use(&self, _flag: &str, _id: &dyn PackageId) -> bool {
            false
        }
        fn mask_for_user(&self, _id: &dyn PackageId) -> Option<String> {
            None
        }
        fn mask_for_breakage(&self, _id: &dyn PackageId) -> Option<String> {
            None
        }
        fn mirrors(&self, _mirror_name: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn make_id(name: &str, version: &str, slot: &str) -> Rc<dyn PackageId> {
        Rc::new(StoredPackageId::new(RawMetadata {
            identity: PackageIdentity {
                name: QualifiedPackageName::parse(name).unwrap(),
                version: VersionSpec::parse(version).unwrap(),
                slot: SlotName::new(slot).unwrap(),
                repository: RepositoryName::new("gentoo").unwrap(),
            },
            eapi: EapiOptions::eapi7(),
            iuse: vec![UseFlagName::new("foo").unwrap()],
            enabled: vec![UseFlagName::new("foo").unwrap()],
            keywords: vec![KeywordName::new("amd64").unwrap()],
            mask_reason: None,
            depend: String::new(),
            rdepend: String::new(),
            pdepend: String::new(),
            sdepend: String::new(),
            license: String::new(),
            src_uri: String::new(),
            provide: String::new(),
        }))
    }

    #[test]
    fn query_selects_highest_version_first() {
        let mut repo = InMemoryRepository::new(RepositoryName::new("gentoo").unwrap(), 0);
        repo.insert(make_id("a/x", "1", "0"));
        repo.insert(make_id("a/x", "2", "0"));
        let db = InMemoryDatabase::new(vec![Rc::new(repo)]);
        let spec = parse_atom("a/x").unwrap();
        let results = db.query(&spec, &QueryOptions::default(), &PermissiveEnv, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].identity().version.to_string(), "2");
    }

    #[test]
    fn best_selection_returns_one() {
        let mut repo = InMemoryRepository::new(RepositoryName::new("gentoo").unwrap(), 0);
        repo.insert(make_id("a/x", "1", "0"));
        repo.insert(make_id("a/x", "2", "0"));
        let db = InMemoryDatabase::new(vec![Rc::new(repo)]);
        let spec = parse_atom("a/x").unwrap();
        let opts = QueryOptions {
            selection: Selection::Best,
            ..Default::default()
        };
        let results = db.query(&spec, &opts, &PermissiveEnv, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity().version.to_string(), "2");
    }

    #[test]
    fn slot_restriction_filters_candidates() {
        let mut repo = InMemoryRepository::new(RepositoryName::new("gentoo").unwrap(), 0);
        repo.insert(make_id("a/x", "1", "1"));
        repo.insert(make_id("a/x", "2", "2"));
        let db = InMemoryDatabase::new(vec![Rc::new(repo)]);
        let spec = parse_atom("a/x:1").unwrap();
        let results = db.query(&spec, &QueryOptions::default(), &PermissiveEnv, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity().slot.as_str(), "1");
    }

    #[test]
    fn repository_priority_breaks_ties_over_version() {
        let mut low = InMemoryRepository::new(RepositoryName::new("overlay").unwrap(), 0);
        low.insert(make_id("a/x", "9", "0"));
        let mut high = InMemoryRepository::new(RepositoryName::new("gentoo").unwrap(), 10);
        high.insert(make_id("a/x", "1", "0"));
        let db = InMemoryDatabase::new(vec![Rc::new(low), Rc::new(high)]);
        let spec = parse_atom("a/x").unwrap();
        let results = db.query(&spec, &QueryOptions::default(), &PermissiveEnv, None).unwrap();
        assert_eq!(results[0].identity().version.to_string(), "1");
    }

    #[test]
    fn unaccepted_keywords_are_filtered_when_visible_only() {
        let mut repo = InMemoryRepository::new(RepositoryName::new("gentoo").unwrap(), 0);
        let mut raw = RawMetadata {
            identity: PackageIdentity {
                name: QualifiedPackageName::parse("a/x").unwrap(),
                version: VersionSpec::parse("1").unwrap(),
                slot: SlotName::new("0").unwrap(),
                repository: RepositoryName::new("gentoo").unwrap(),
            },
            eapi: EapiOptions::eapi7(),
            iuse: Vec::new(),
            enabled: Vec::new(),
            keywords: Vec::new(),
            mask_reason: None,
            depend: String::new(),
            rdepend: String::new(),
            pdepend: String::new(),
            sdepend: String::new(),
            license: String::new(),
            src_uri: String::new(),
            provide: String::new(),
        };
        raw.keywords = Vec::new();
        repo.insert(Rc::new(StoredPackageId::new(raw)));
        let db = InMemoryDatabase::new(vec![Rc::new(repo)]);
        let spec = parse_atom("a/x").unwrap();
        let results = db.query(&spec, &QueryOptions::default(), &PermissiveEnv, None).unwrap();
        assert!(results.is_empty());
    }
}
