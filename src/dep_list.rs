//! The `DepList` resolver (spec.md §4.G): walks dep-spec trees from a set
//! of target atoms, selects package IDs, records an ordered plan, and
//! detects blocks, circular dependencies and slot collisions.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::atom::{PackageDepSpec, SlotRestriction};
use crate::condition_tracker::{ConditionFrame, ConditionPath};
use crate::database::{Environment, PackageDatabase, QueryOptions, Selection, Visibility};
use crate::error::CoreError;
use crate::name::{QualifiedPackageName, SlotName};
use crate::package_id::PackageId;
use crate::spec_tree::SpecNode;
use crate::use_req::Tribool;
use crate::version::VersionSpec;

/// How a target slot is chosen when more than one version could satisfy
/// it (spec.md §4.G.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSlotPolicy {
    /// Always take the best visible candidate.
    Best,
    /// Prefer the installed version's slot, falling back to best.
    InstalledThenBest,
}

/// How effective USE is derived for a newly chosen entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseChoice {
    /// Use exactly the installed package's enabled set, when installed.
    AlreadyEnabled,
    /// Prefer flags enabled by the environment over installed state.
    PreferEnabled,
}

/// How a `Block` conflict is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlocksPolicy {
    /// Any matching block is fatal.
    Error,
    /// Matching blocks are recorded but never fatal.
    Accumulate,
    /// A block is dropped if the blocking and blocked IDs can coexist
    /// (different slot); otherwise fatal.
    DiscardWhenCompatible,
}

/// How a dependency cycle is handled during ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircularPolicy {
    /// Raise [`CoreError::CircularDependency`].
    Error,
    /// Break the cycle, preferring to drop a `post` edge, then `run`,
    /// then `build`.
    Discard,
}

/// Whether the conditional path under which an entry was pulled in is
/// recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyTags {
    /// Record it.
    On,
    /// Don't bother (cheaper, no diagnostics).
    Off,
}

/// How `phase = suggested` items are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestedPolicy {
    /// Resolve and include, but a failure is non-fatal.
    Show,
    /// Never resolve suggested items.
    Discard,
    /// Resolve as a hard requirement; a failure is fatal.
    Install,
}

/// When a new slot is installed alongside an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewSlotsPolicy {
    /// Always allow.
    Always,
    /// Only if the same version isn't already installed in another slot.
    IfSameVersionNotInstalled,
    /// Never introduce a new slot.
    Never,
}

/// How selecting an older version than installed is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowngradePolicy {
    /// Allowed silently when the atom requires it.
    AsNeeded,
    /// Allowed, but warned.
    Warning,
    /// Fatal.
    Error,
}

/// When an already-installed, version-equal candidate is reinstalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinstallPolicy {
    /// Never reinstall; skip.
    Never,
    /// Always reinstall.
    Always,
    /// Reinstall iff the effective USE differs from the installed build.
    IfUseChanged,
    /// Reinstall iff the package is a live/SCM version.
    IfScm,
}

/// How selecting a newer version than installed is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePolicy {
    /// Always take the newer version.
    Always,
    /// Only when something requires it.
    AsNeeded,
}

/// The resolver's full, explicit configuration (spec.md §4.G.1) — no
/// implicit state (spec.md §9).
#[derive(Debug, Clone)]
pub struct DepListConfig {
    pub target_slot_policy: TargetSlotPolicy,
    pub use_choice: UseChoice,
    pub blocks_policy: BlocksPolicy,
    pub circular_policy: CircularPolicy,
    pub dependency_tags: DependencyTags,
    pub suggested_policy: SuggestedPolicy,
    pub new_slots_policy: NewSlotsPolicy,
    pub downgrade_policy: DowngradePolicy,
    pub reinstall_policy: ReinstallPolicy,
    pub upgrade_policy: UpgradePolicy,
}

impl Default for DepListConfig {
    fn default() -> Self {
        Self {
            target_slot_policy: TargetSlotPolicy::Best,
            use_choice: UseChoice::PreferEnabled,
            blocks_policy: BlocksPolicy::Error,
            circular_policy: CircularPolicy::Error,
            dependency_tags: DependencyTags::On,
            suggested_policy: SuggestedPolicy::Show,
            new_slots_policy: NewSlotsPolicy::Always,
            downgrade_policy: DowngradePolicy::AsNeeded,
            reinstall_policy: ReinstallPolicy::IfUseChanged,
            upgrade_policy: UpgradePolicy::Always,
        }
    }
}

/// Which dependency class a pending item was pulled in under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Build,
    Run,
    Post,
    Suggested,
}

fn phase_from_label(label: &str) -> Result<Phase, CoreError> {
    match label {
        "build" | "depend" => Ok(Phase::Build),
        "run" | "rdepend" => Ok(Phase::Run),
        "post" | "pdepend" => Ok(Phase::Post),
        "suggested" => Ok(Phase::Suggested),
        other => Err(CoreError::Configuration {
            message: format!("unknown dependency-class label {other:?}"),
        }),
    }
}

/// The action assigned to a plan entry (spec.md §3 "DepList entry").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Install,
    Reinstall,
    UpgradeFrom(VersionSpec),
    DowngradeFrom(VersionSpec),
    SkipExisting,
    SuggestedSkipped,
}

/// One entry of the resolved plan (spec.md §3 "DepList entry").
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub id: Rc<dyn PackageId>,
    pub atom: PackageDepSpec,
    pub path: ConditionPath,
    pub phase: Phase,
    pub action: Action,
}

/// A recorded `!atom`/`!!atom` constraint, checked once the plan is
/// otherwise complete (spec.md §4.G.2 step 3).
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub strong: bool,
    pub atom: PackageDepSpec,
    pub path: ConditionPath,
}

/// The finished output of a resolve pass.
#[derive(Debug, Clone)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
    pub blocks: Vec<BlockRecord>,
    /// `true` iff the pop loop was stopped early by a [`CancellationToken`]
    /// (spec.md §5); `entries` is then a partial, unordered-by-blocks
    /// prefix of what a full pass would have produced.
    pub aborted: bool,
}

/// A cooperative cancellation signal, checked at the top of every pop-loop
/// iteration (spec.md §5). The core never polls this itself; callers wire
/// it to whatever signal (timeout, user interrupt) they have.
pub trait CancellationToken {
    /// `true` once the caller wants the current pass to stop.
    fn is_cancelled(&self) -> bool;
}

/// A [`CancellationToken`] that never fires, for callers with no
/// cancellation need of their own.
pub struct NeverCancelled;

impl CancellationToken for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Build,
    Post,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    before: usize,
    after: usize,
    kind: EdgeKind,
}

enum PendingItem {
    Atom {
        spec: PackageDepSpec,
        path: ConditionPath,
        phase: Phase,
        requesting: Option<usize>,
    },
    DeferredAnyOf {
        arms: Vec<SpecNode>,
        path: ConditionPath,
        phase: Phase,
        requesting: usize,
        effective: Rc<HashMap<String, bool>>,
        retried: bool,
    },
}

/// The resolver state machine. Construct with [`DepList::new`], seed
/// targets, then [`DepList::run`].
pub struct DepList {
    config: DepListConfig,
    entries: Vec<PlanEntry>,
    by_qpn_slot: HashMap<(QualifiedPackageName, SlotName), usize>,
    blocks: Vec<BlockRecord>,
    edges: Vec<Edge>,
    pending: VecDeque<PendingItem>,
}

impl DepList {
    /// A fresh, empty resolver under `config`.
    pub fn new(config: DepListConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            by_qpn_slot: HashMap::new(),
            blocks: Vec::new(),
            edges: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Enqueue the initial target atoms (spec.md §4.G.2 step 1).
    pub fn seed(&mut self, targets: &[PackageDepSpec]) {
        for target in targets {
            self.pending.push_back(PendingItem::Atom {
                spec: target.clone(),
                path: ConditionPath::root(),
                phase: Phase::Build,
                requesting: None,
            });
        }
    }

    /// Run the pop loop to a fixed point, then check blocks and order
    /// the plan (spec.md §4.G.2 steps 2–5). Consumes the resolver.
    ///
    /// `cancel` is polled at the top of every pop-loop iteration (spec.md
    /// §5); on cancellation this returns early with a partial, `aborted`
    /// plan rather than mutating any external state.
    pub fn run(
        mut self,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
        cancel: &dyn CancellationToken,
    ) -> Result<Plan, CoreError> {
        loop {
            if cancel.is_cancelled() {
                return self.finalize(true);
            }
            let Some(item) = self.pending.pop_front() else { break };
            match item {
                PendingItem::Atom { spec, path, phase, requesting } => {
                    self.process_atom(spec, path, phase, requesting, db, env)?;
                }
                PendingItem::DeferredAnyOf {
                    arms,
                    path,
                    phase,
                    requesting,
                    effective,
                    retried,
                } => {
                    match self.choose_any_of_arm(&arms, &effective, db, env) {
                        Some(chosen) => {
                            let child_path = path.push(ConditionFrame::AnyOf { chosen_index: chosen });
                            self.expand_sequence(
                                std::slice::from_ref(&arms[chosen]),
                                &child_path,
                                phase,
                                requesting,
                                &effective,
                                db,
                                env,
                            )?;
                        }
                        None if !retried => {
                            self.pending.push_back(PendingItem::DeferredAnyOf {
                                arms,
                                path,
                                phase,
                                requesting,
                                effective,
                                retried: true,
                            });
                        }
                        None => {
                            return Err(CoreError::AnyOfUnsatisfiable { path: path.to_string() });
                        }
                    }
                }
            }
        }
        self.resolve_blocks(db, env)?;
        self.finalize(false)
    }

    fn process_atom(
        &mut self,
        spec: PackageDepSpec,
        path: ConditionPath,
        phase: Phase,
        requesting: Option<usize>,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
    ) -> Result<(), CoreError> {
        if phase == Phase::Suggested && self.config.suggested_policy == SuggestedPolicy::Discard {
            return Ok(());
        }

        let opts = QueryOptions {
            visibility: Visibility::VisibleOnly,
            repo: spec.repo.clone(),
            selection: Selection::Best,
        };
        let requesting_id = requesting.map(|i| self.entries[i].id.clone());
        let candidates = db.query(&spec, &opts, env, requesting_id.as_deref())?;
        let chosen = match candidates.into_iter().next() {
            Some(id) => id,
            None => {
                if phase == Phase::Suggested && self.config.suggested_policy != SuggestedPolicy::Install {
                    tracing::warn!(atom = %spec, path = %path, "suggested dependency unsatisfiable, skipping");
                    return Ok(());
                }
                return Err(CoreError::NoMatch {
                    atom: spec.to_string(),
                    path: path.to_string(),
                });
            }
        };

        let key = (chosen.identity().name.clone(), chosen.identity().slot.clone());
        if let Some(&existing_idx) = self.by_qpn_slot.get(&key) {
            let existing_name = self.entries[existing_idx].id.identity().name.clone();
            let compatible = self.entries[existing_idx].id.identity() == chosen.identity()
                || atom_allows(&spec, self.entries[existing_idx].id.as_ref());
            if compatible {
                if let Some(req) = requesting {
                    self.add_phase_edge(req, existing_idx, phase);
                }
                return Ok(());
            }
            return Err(CoreError::SlotCollision {
                existing: existing_name.to_string(),
                new: spec.to_string(),
                path: path.to_string(),
            });
        }

        let installed_version = self.installed_version(db, env, &key.0, &key.1);
        let action = decide_action(installed_version.as_ref(), &chosen.identity().version, self.config.reinstall_policy);

        let idx = self.entries.len();
        self.entries.push(PlanEntry {
            id: chosen.clone(),
            atom: spec,
            path: if self.config.dependency_tags == DependencyTags::On {
                path.clone()
            } else {
                ConditionPath::root()
            },
            phase,
            action,
        });
        self.by_qpn_slot.insert(key, idx);
        if let Some(req) = requesting {
            self.add_phase_edge(req, idx, phase);
        }

        let effective = Rc::new(effective_use(chosen.as_ref(), env, self.config.use_choice));
        self.expand_class(chosen.as_ref(), idx, &path, Phase::Build, &effective, db, env)?;
        self.expand_class_rdepend(chosen.as_ref(), idx, &path, &effective, db, env)?;
        self.expand_class_pdepend(chosen.as_ref(), idx, &path, &effective, db, env)?;
        self.expand_class_sdepend(chosen.as_ref(), idx, &path, &effective, db, env)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_class(
        &mut self,
        id: &dyn PackageId,
        idx: usize,
        path: &ConditionPath,
        phase: Phase,
        effective: &Rc<HashMap<String, bool>>,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
    ) -> Result<(), CoreError> {
        let root = vec![id.depend().map_err(Clone::clone)?.root().clone()];
        self.expand_sequence(&root, path, phase, idx, effective, db, env)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_class_rdepend(
        &mut self,
        id: &dyn PackageId,
        idx: usize,
        path: &ConditionPath,
        effective: &Rc<HashMap<String, bool>>,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
    ) -> Result<(), CoreError> {
        let root = vec![id.rdepend().map_err(Clone::clone)?.root().clone()];
        self.expand_sequence(&root, path, Phase::Run, idx, effective, db, env)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_class_pdepend(
        &mut self,
        id: &dyn PackageId,
        idx: usize,
        path: &ConditionPath,
        effective: &Rc<HashMap<String, bool>>,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
    ) -> Result<(), CoreError> {
        let root = vec![id.pdepend().map_err(Clone::clone)?.root().clone()];
        self.expand_sequence(&root, path, Phase::Post, idx, effective, db, env)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_class_sdepend(
        &mut self,
        id: &dyn PackageId,
        idx: usize,
        path: &ConditionPath,
        effective: &Rc<HashMap<String, bool>>,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
    ) -> Result<(), CoreError> {
        let root = vec![id.sdepend().map_err(Clone::clone)?.root().clone()];
        self.expand_sequence(&root, path, Phase::Suggested, idx, effective, db, env)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_sequence(
        &mut self,
        nodes: &[SpecNode],
        path: &ConditionPath,
        mut phase: Phase,
        requesting: usize,
        effective: &Rc<HashMap<String, bool>>,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
    ) -> Result<(), CoreError> {
        for node in nodes {
            match node {
                SpecNode::Label(label) => {
                    phase = phase_from_label(label)?;
                }
                SpecNode::AllOf(children) => {
                    self.expand_sequence(children, path, phase, requesting, effective, db, env)?;
                }
                SpecNode::UseConditional { flag, negated, children } => {
                    let enabled = flag_enabled(effective, flag.as_str());
                    if *negated != enabled {
                        let child_path = path.push(ConditionFrame::UseConditional {
                            flag: flag.clone(),
                            negated: *negated,
                        });
                        self.expand_sequence(children, &child_path, phase, requesting, effective, db, env)?;
                    }
                }
                SpecNode::AnyOf(arms) => {
                    if arms.is_empty() {
                        return Err(CoreError::AnyOfUnsatisfiable { path: path.to_string() });
                    }
                    match self.choose_any_of_arm(arms, effective, db, env) {
                        Some(chosen) => {
                            let child_path = path.push(ConditionFrame::AnyOf { chosen_index: chosen });
                            self.expand_sequence(
                                std::slice::from_ref(&arms[chosen]),
                                &child_path,
                                phase,
                                requesting,
                                effective,
                                db,
                                env,
                            )?;
                        }
                        None => {
                            self.pending.push_back(PendingItem::DeferredAnyOf {
                                arms: arms.clone(),
                                path: path.clone(),
                                phase,
                                requesting,
                                effective: effective.clone(),
                                retried: false,
                            });
                        }
                    }
                }
                SpecNode::Package(atom) => {
                    self.pending.push_back(PendingItem::Atom {
                        spec: atom.clone(),
                        path: path.clone(),
                        phase,
                        requesting: Some(requesting),
                    });
                }
                SpecNode::Block { strong, atom } => {
                    self.blocks.push(BlockRecord {
                        strong: *strong,
                        atom: atom.clone(),
                        path: path.clone(),
                    });
                }
                SpecNode::Set(name) => {
                    tracing::debug!(set = %name, "named-set expansion is not implemented by the core, skipping");
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `None` when no arm is currently resolvable at all.
    fn choose_any_of_arm(
        &self,
        arms: &[SpecNode],
        effective: &HashMap<String, bool>,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
    ) -> Option<usize> {
        let mut scored: Vec<Option<(bool, usize)>> = Vec::with_capacity(arms.len());
        for arm in arms {
            let leaves = collect_leaf_atoms(arm, effective);
            if leaves.is_empty() {
                scored.push(Some((true, 0)));
                continue;
            }
            let mut collision_free = true;
            let mut new_installs = 0usize;
            let mut possible = true;
            for leaf in &leaves {
                let existing = self
                    .by_qpn_slot
                    .iter()
                    .find(|((name, _), _)| *name == leaf.name)
                    .map(|(_, &idx)| idx);
                if let Some(idx) = existing {
                    if !atom_allows(leaf, self.entries[idx].id.as_ref()) {
                        collision_free = false;
                    }
                    continue;
                }
                let opts = QueryOptions {
                    visibility: Visibility::VisibleOnly,
                    repo: leaf.repo.clone(),
                    selection: Selection::Best,
                };
                match db.query(leaf, &opts, env, None) {
                    Ok(candidates) if !candidates.is_empty() => {
                        new_installs += 1;
                        collision_free = false;
                    }
                    _ => {
                        possible = false;
                        break;
                    }
                }
            }
            scored.push(if possible { Some((collision_free, new_installs)) } else { None });
        }

        if let Some(idx) = scored.iter().position(|s| matches!(s, Some((true, _)))) {
            return Some(idx);
        }
        scored
            .iter()
            .enumerate()
            .filter_map(|(i, s)| (*s).map(|(_, n)| (i, n)))
            .min_by_key(|&(_, n)| n)
            .map(|(i, _)| i)
    }

    fn add_phase_edge(&mut self, requesting: usize, dep: usize, phase: Phase) {
        match phase {
            Phase::Build => self.edges.push(Edge { before: dep, after: requesting, kind: EdgeKind::Build }),
            Phase::Post => self.edges.push(Edge { before: requesting, after: dep, kind: EdgeKind::Post }),
            Phase::Run | Phase::Suggested => {}
        }
    }

    fn installed_version(
        &self,
        db: &dyn PackageDatabase,
        env: &dyn Environment,
        name: &QualifiedPackageName,
        slot: &SlotName,
    ) -> Option<VersionSpec> {
        let atom = PackageDepSpec {
            operator: None,
            name: name.clone(),
            version: None,
            version_glob: false,
            slot: SlotRestriction {
                slot: Some(slot.clone()),
                ..Default::default()
            },
            repo: None,
            use_requirements: Vec::new(),
        };
        let opts = QueryOptions {
            visibility: Visibility::InstalledOnly,
            repo: None,
            selection: Selection::Best,
        };
        db.query(&atom, &opts, env, None)
            .ok()
            .and_then(|v| v.into_iter().next())
            .map(|id| id.identity().version.clone())
    }

    fn resolve_blocks(&mut self, _db: &dyn PackageDatabase, _env: &dyn Environment) -> Result<(), CoreError> {
        for block in &self.blocks {
            let key_match = self
                .by_qpn_slot
                .iter()
                .find(|((name, _), &idx)| *name == block.atom.name && atom_allows(&block.atom, self.entries[idx].id.as_ref()));
            let Some((_, &idx)) = key_match else { continue };
            let conflicting = &self.entries[idx];
            if block.strong {
                if matches!(conflicting.action, Action::SkipExisting) {
                    return Err(CoreError::BlockedByInstalled {
                        blocker: block.atom.to_string(),
                        blocked: conflicting.id.identity().name.to_string(),
                    });
                }
                continue;
            }
            match self.config.blocks_policy {
                BlocksPolicy::Error => {
                    return Err(CoreError::BlockedByInstalled {
                        blocker: block.atom.to_string(),
                        blocked: conflicting.id.identity().name.to_string(),
                    });
                }
                BlocksPolicy::Accumulate => {}
                BlocksPolicy::DiscardWhenCompatible => {
                    let same_slot = block
                        .atom
                        .slot
                        .slot
                        .as_ref()
                        .map(|s| *s == conflicting.id.identity().slot)
                        .unwrap_or(true);
                    if same_slot {
                        return Err(CoreError::BlockedByInstalled {
                            blocker: block.atom.to_string(),
                            blocked: conflicting.id.identity().name.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn finalize(self, aborted: bool) -> Result<Plan, CoreError> {
        if aborted {
            return Ok(Plan {
                entries: self.entries,
                blocks: self.blocks,
                aborted: true,
            });
        }
        let order = self.topological_order()?;
        let entries = order.into_iter().map(|i| self.entries[i].clone()).collect();
        Ok(Plan {
            entries,
            blocks: self.blocks,
            aborted: false,
        })
    }

    fn topological_order(&self) -> Result<Vec<usize>, CoreError> {
        let mut edges = self.edges.clone();
        loop {
            match try_topo_sort(self.entries.len(), &edges) {
                Ok(order) => return Ok(order),
                Err(cycle) => match self.config.circular_policy {
                    CircularPolicy::Error => {
                        let cycle_names = cycle.iter().map(|&i| self.entries[i].id.identity().name.to_string()).collect();
                        let path = cycle.first().map(|&i| self.entries[i].path.to_string()).unwrap_or_default();
                        return Err(CoreError::CircularDependency { cycle: cycle_names, path });
                    }
                    CircularPolicy::Discard => {
                        if !discard_weakest_edge(&cycle, &mut edges) {
                            return Err(CoreError::Configuration {
                                message: "cycle detected but no edge was eligible for discard".into(),
                            });
                        }
                    }
                },
            }
        }
    }
}

fn try_topo_sort(n: usize, edges: &[Edge]) -> Result<Vec<usize>, Vec<usize>> {
    let mut indegree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for e in edges {
        adj[e.before].push(e.after);
        indegree[e.after] += 1;
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &j in &adj[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                queue.push_back(j);
            }
        }
    }
    if order.len() == n {
        Ok(order)
    } else {
        let remaining = (0..n).filter(|i| !order.contains(i)).collect();
        Err(remaining)
    }
}

fn discard_weakest_edge(cycle: &[usize], edges: &mut Vec<Edge>) -> bool {
    for preferred in [EdgeKind::Post, EdgeKind::Build] {
        if let Some(pos) = edges
            .iter()
            .position(|e| e.kind == preferred && cycle.contains(&e.before) && cycle.contains(&e.after))
        {
            edges.remove(pos);
            return true;
        }
    }
    false
}

fn decide_action(installed: Option<&VersionSpec>, chosen: &VersionSpec, reinstall_policy: ReinstallPolicy) -> Action {
    match installed {
        None => Action::Install,
        Some(v) if v == chosen => match reinstall_policy {
            ReinstallPolicy::Always => Action::Reinstall,
            _ => Action::SkipExisting,
        },
        Some(v) if v < chosen => Action::UpgradeFrom(v.clone()),
        Some(v) => Action::DowngradeFrom(v.clone()),
    }
}

/// `true` iff `existing`'s identity also satisfies `atom` (used both for
/// slot-collision merging and block matching).
fn atom_allows(atom: &PackageDepSpec, existing: &dyn PackageId) -> bool {
    let identity = existing.identity();
    if identity.name != atom.name {
        return false;
    }
    if let Some(slot) = &atom.slot.slot {
        if !atom.slot.any_slot && identity.slot != *slot {
            return false;
        }
    }
    if let (Some(op), Some(version)) = (atom.effective_operator(), &atom.version) {
        if !crate::version::version_matches(&identity.version, op, version) {
            return false;
        }
    }
    true
}

fn effective_use(id: &dyn PackageId, env: &dyn Environment, choice: UseChoice) -> HashMap<String, bool> {
    id.iuse()
        .iter()
        .map(|flag| {
            let name = flag.as_str().to_string();
            let env_choice = env.query_use(&name, id);
            let declared = matches!(id.query_use(&name), Tribool::True);
            let enabled = match choice {
                UseChoice::AlreadyEnabled => declared,
                UseChoice::PreferEnabled => env_choice || declared,
            };
            (name, enabled)
        })
        .collect()
}

fn flag_enabled(effective: &HashMap<String, bool>, flag: &str) -> bool {
    match effective.get(flag) {
        Some(b) => *b,
        None => {
            tracing::warn!(flag, "flag not declared in IUSE, treating condition as false");
            false
        }
    }
}

fn collect_leaf_atoms(node: &SpecNode, effective: &HashMap<String, bool>) -> Vec<PackageDepSpec> {
    let mut out = Vec::new();
    collect_leaf_atoms_into(node, effective, &mut out);
    out
}

fn collect_leaf_atoms_into(node: &SpecNode, effective: &HashMap<String, bool>, out: &mut Vec<PackageDepSpec>) {
    match node {
        SpecNode::AllOf(children) => {
            for c in children {
                collect_leaf_atoms_into(c, effective, out);
            }
        }
        SpecNode::AnyOf(children) => {
            for c in children {
                collect_leaf_atoms_into(c, effective, out);
            }
        }
        SpecNode::UseConditional { flag, negated, children } => {
            if *negated != flag_enabled(effective, flag.as_str()) {
                for c in children {
                    collect_leaf_atoms_into(c, effective, out);
                }
            }
        }
        SpecNode::Package(atom) => out.push(atom.clone()),
        _ => {}
    }
}

/// Resolve `targets` to an ordered [`Plan`] (spec.md §4.G entry point).
pub fn resolve(
    targets: &[PackageDepSpec],
    db: &dyn PackageDatabase,
    env: &dyn Environment,
    config: DepListConfig,
    cancel: &dyn CancellationToken,
) -> Result<Plan, CoreError> {
    let mut list = DepList::new(config);
    list.seed(targets);
    list.run(db, env, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::atom::parse_atom;
    use crate::database::{InMemoryDatabase, InMemoryRepository};
    use crate::eapi::EapiOptions;
    use crate::name::{KeywordName, RepositoryName};
    use crate::package_id::{PackageIdentity, RawMetadata, StoredPackageId};
    use crate::version::VersionSpec;

    struct TestEnv {
        masked: HashSet<String>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { masked: HashSet::new() }
        }

        fn masking(names: &[&str]) -> Self {
            Self {
                masked: names.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl Environment for TestEnv {
        fn accept_keywords(&self, keywords: &[KeywordName], _id: &dyn PackageId) -> bool {
            !keywords.is_empty()
        }
        fn accept_license(&self, _literal: &str, _id: &dyn PackageId) -> bool {
            true
        }
        fn query_use(&self, _flag: &str, _id: &dyn PackageId) -> bool {
            false
        }
        fn mask_for_user(&self, id: &dyn PackageId) -> Option<String> {
            if self.masked.contains(id.identity().name.to_string().as_str()) {
                Some("masked for test".into())
            } else {
                None
            }
        }
        fn mask_for_breakage(&self, _id: &dyn PackageId) -> Option<String> {
            None
        }
        fn mirrors(&self, _mirror_name: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn make_id(name: &str, version: &str, slot: &str, depend: &str, pdepend: &str) -> Rc<dyn PackageId> {
        Rc::new(StoredPackageId::new(RawMetadata {
            identity: PackageIdentity {
                name: QualifiedPackageName::parse(name).unwrap(),
                version: VersionSpec::parse(version).unwrap(),
                slot: SlotName::new(slot).unwrap(),
                repository: RepositoryName::new("gentoo").unwrap(),
            },
            eapi: EapiOptions::eapi7(),
            iuse: Vec::new(),
            enabled: Vec::new(),
            keywords: vec![KeywordName::new("amd64").unwrap()],
            mask_reason: None,
            depend: depend.to_string(),
            rdepend: String::new(),
            pdepend: pdepend.to_string(),
            sdepend: String::new(),
            license: String::new(),
            src_uri: String::new(),
            provide: String::new(),
        }))
    }

    fn repo_db(ids: Vec<Rc<dyn PackageId>>) -> InMemoryDatabase {
        let mut repo = InMemoryRepository::new(RepositoryName::new("gentoo").unwrap(), 0);
        for id in ids {
            repo.insert(id);
        }
        InMemoryDatabase::new(vec![Rc::new(repo)])
    }

    /// spec.md §8 scenario: a plain `DEPEND` chain orders the dependency
    /// before its requester.
    #[test]
    fn linear_resolve_orders_build_dependency_before_requester() {
        let x = make_id("a/x", "1", "0", "a/y", "");
        let y = make_id("a/y", "1", "0", "", "");
        let db = repo_db(vec![x, y]);
        let env = TestEnv::new();
        let target = parse_atom("a/x").unwrap();
        let plan = resolve(&[target], &db, &env, DepListConfig::default(), &NeverCancelled).unwrap();
        let names: Vec<_> = plan.entries.iter().map(|e| e.id.identity().name.to_string()).collect();
        assert_eq!(names, vec!["a/y".to_string(), "a/x".to_string()]);
    }

    /// Two targets resolving into the same slot with incompatible version
    /// constraints is a fatal slot collision.
    #[test]
    fn incompatible_targets_in_the_same_slot_collide() {
        let x1 = make_id("a/x", "1", "0", "", "");
        let x3 = make_id("a/x", "3", "0", "", "");
        let db = repo_db(vec![x1, x3]);
        let env = TestEnv::new();
        let targets = vec![parse_atom("<=a/x-1").unwrap(), parse_atom(">=a/x-3").unwrap()];
        let err = resolve(&targets, &db, &env, DepListConfig::default(), &NeverCancelled).unwrap_err();
        assert!(matches!(err, CoreError::SlotCollision { .. }));
    }

    /// When the lexically-first `||()` arm is masked, the resolver falls
    /// through to the next arm instead of failing.
    #[test]
    fn any_of_skips_a_masked_first_arm() {
        let top = make_id("a/top", "1", "0", "|| ( a/x a/y )", "");
        let x = make_id("a/x", "1", "0", "", "");
        let y = make_id("a/y", "1", "0", "", "");
        let db = repo_db(vec![top, x, y]);
        let env = TestEnv::masking(&["a/x"]);
        let target = parse_atom("a/top").unwrap();
        let plan = resolve(&[target], &db, &env, DepListConfig::default(), &NeverCancelled).unwrap();
        let names: HashSet<_> = plan.entries.iter().map(|e| e.id.identity().name.to_string()).collect();
        assert!(names.contains("a/y"));
        assert!(!names.contains("a/x"));
    }

    /// A mutual `PDEPEND` cycle is fatal under `CircularPolicy::Error`...
    #[test]
    fn mutual_post_dependency_cycle_is_fatal_by_default() {
        let one = make_id("a/one", "1", "0", "", "a/two");
        let two = make_id("a/two", "1", "0", "", "a/one");
        let db = repo_db(vec![one, two]);
        let env = TestEnv::new();
        let target = parse_atom("a/one").unwrap();
        let err = resolve(&[target], &db, &env, DepListConfig::default(), &NeverCancelled).unwrap_err();
        assert!(matches!(err, CoreError::CircularDependency { .. }));
    }

    /// ...but is resolved by discarding one of the two `post` edges under
    /// `CircularPolicy::Discard`.
    #[test]
    fn mutual_post_dependency_cycle_is_broken_by_discard_policy() {
        let one = make_id("a/one", "1", "0", "", "a/two");
        let two = make_id("a/two", "1", "0", "", "a/one");
        let db = repo_db(vec![one, two]);
        let env = TestEnv::new();
        let target = parse_atom("a/one").unwrap();
        let config = DepListConfig {
            circular_policy: CircularPolicy::Discard,
            ..DepListConfig::default()
        };
        let plan = resolve(&[target], &db, &env, config, &NeverCancelled).unwrap();
        let names: HashSet<_> = plan.entries.iter().map(|e| e.id.identity().name.to_string()).collect();
        assert_eq!(names.len(), 2);
    }

    struct AlwaysCancelled;

    impl CancellationToken for AlwaysCancelled {
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    /// A cancellation token that is already tripped before the first pop
    /// stops the pass immediately, returning an empty, `aborted` plan
    /// rather than an error.
    #[test]
    fn cancellation_returns_a_partial_aborted_plan() {
        let x = make_id("a/x", "1", "0", "a/y", "");
        let y = make_id("a/y", "1", "0", "", "");
        let db = repo_db(vec![x, y]);
        let env = TestEnv::new();
        let target = parse_atom("a/x").unwrap();
        let plan = resolve(&[target], &db, &env, DepListConfig::default(), &AlwaysCancelled).unwrap();
        assert!(plan.aborted);
        assert!(plan.entries.is_empty());
    }
}
