//! Config graph - resolved actions and their dependency edges.

use crate::action::{ActionInfo, ActionKind, ActionRef, DeclaredAction, ResolvedAction};
use crate::error::{GraphError, ResolveError};
use crate::template::ResolveContext;
use crate::validate::ConfigValidator;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// A validated, acyclic graph of resolved actions.
///
/// Built once per run and read-only afterwards, so it can be shared across
/// tasks without locking.
#[derive(Debug, Clone)]
pub struct ConfigGraph {
    /// All actions, in declaration order
    actions: Vec<ResolvedAction>,
    /// reference -> index into `actions`
    index: HashMap<ActionRef, usize>,
    /// action -> [dependencies]
    dependencies: Vec<Vec<usize>>,
    /// action -> [dependants]
    dependants: Vec<Vec<usize>>,
}

impl ConfigGraph {
    /// Validate, link and resolve a set of declared actions.
    ///
    /// Fails on the first invalid action, on duplicate names within a kind,
    /// on dependencies that aren't declared, and on dependency cycles.
    pub fn build(
        declared: Vec<DeclaredAction>,
        validator: &dyn ConfigValidator,
        context: &ResolveContext,
    ) -> Result<Self, GraphError> {
        let declared = declared
            .into_iter()
            .map(|a| validator.validate(a))
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = HashMap::with_capacity(declared.len());
        for (i, action) in declared.iter().enumerate() {
            if index.insert(action.reference(), i).is_some() {
                return Err(GraphError::DuplicateAction(action.reference()));
            }
        }

        let mut dependencies = vec![Vec::new(); declared.len()];
        let mut dependants = vec![Vec::new(); declared.len()];
        for (i, action) in declared.iter().enumerate() {
            for dep in &action.dependencies {
                let j = *index.get(dep).ok_or_else(|| ResolveError::MissingDependency {
                    action: action.reference(),
                    dependency: dep.clone(),
                })?;
                if !dependencies[i].contains(&j) {
                    dependencies[i].push(j);
                    dependants[j].push(i);
                }
            }
        }

        let all: Vec<usize> = (0..declared.len()).collect();
        let order = sort(&all, &dependencies, &dependants, |i| i).map_err(|cycle| {
            GraphError::Cycle(cycle.into_iter().map(|i| declared[i].reference()).collect())
        })?;

        let mut positions = vec![0; declared.len()];
        for (position, &i) in order.iter().enumerate() {
            positions[i] = position;
        }

        let actions = declared
            .into_iter()
            .enumerate()
            .map(|(i, action)| {
                action.resolve(positions[i], context, |dep| {
                    index.get(dep).map(|_| dep.clone())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Resolved config graph with {} actions", actions.len());

        Ok(Self {
            actions,
            index,
            dependencies,
            dependants,
        })
    }

    /// All actions, in declaration order.
    pub fn actions(&self) -> &[ResolvedAction] {
        &self.actions
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the graph has no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Look up an action by reference.
    pub fn get(&self, reference: &ActionRef) -> Option<&ResolvedAction> {
        self.index.get(reference).map(|&i| &self.actions[i])
    }

    /// Look up an action by kind and name.
    pub fn get_by_name(&self, kind: ActionKind, name: &str) -> Result<&ResolvedAction, GraphError> {
        let reference = ActionRef::new(kind, name);
        self.get(&reference).ok_or(GraphError::NotFound(reference))
    }

    /// All actions of a kind, in declaration order.
    pub fn get_by_kind(&self, kind: ActionKind) -> Vec<&ResolvedAction> {
        self.actions.iter().filter(|a| a.kind() == kind).collect()
    }

    /// Direct dependencies of an action.
    pub fn get_dependencies(&self, action: &impl ActionInfo) -> Vec<&ResolvedAction> {
        self.neighbours(action, &self.dependencies)
    }

    /// Actions that directly depend on an action.
    pub fn get_dependants(&self, action: &impl ActionInfo) -> Vec<&ResolvedAction> {
        self.neighbours(action, &self.dependants)
    }

    /// The given actions plus everything they transitively depend on, in
    /// topological order.
    pub fn with_dependencies(
        &self,
        subset: &[ActionRef],
    ) -> Result<Vec<&ResolvedAction>, GraphError> {
        let mut seen = BTreeSet::new();
        let mut stack = self.indices(subset)?;

        while let Some(i) = stack.pop() {
            if seen.insert(i) {
                stack.extend(self.dependencies[i].iter().copied());
            }
        }

        let mut closure: Vec<usize> = seen.into_iter().collect();
        closure.sort_by_key(|&i| self.actions[i].position());
        Ok(closure.into_iter().map(|i| &self.actions[i]).collect())
    }

    /// Order a subset so every action comes after its dependencies.
    ///
    /// Only edges between members of the subset are considered. Fails with
    /// [`GraphError::Cycle`] if those edges contain a cycle, which `build`
    /// already rules out.
    pub fn topological_order(
        &self,
        subset: &[ActionRef],
    ) -> Result<Vec<&ResolvedAction>, GraphError> {
        let mut nodes = self.indices(subset)?;
        nodes.sort_unstable();
        nodes.dedup();

        let order = sort(&nodes, &self.dependencies, &self.dependants, |i| {
            self.actions[i].position()
        })
        .map_err(|cycle| {
            GraphError::Cycle(cycle.into_iter().map(|i| self.actions[i].reference()).collect())
        })?;

        Ok(order.into_iter().map(|i| &self.actions[i]).collect())
    }

    fn indices(&self, refs: &[ActionRef]) -> Result<Vec<usize>, GraphError> {
        refs.iter()
            .map(|r| {
                self.index
                    .get(r)
                    .copied()
                    .ok_or_else(|| GraphError::NotFound(r.clone()))
            })
            .collect()
    }

    fn neighbours(&self, action: &impl ActionInfo, edges: &[Vec<usize>]) -> Vec<&ResolvedAction> {
        self.index
            .get(&action.reference())
            .map(|&i| edges[i].iter().map(|&j| &self.actions[j]).collect())
            .unwrap_or_default()
    }
}

/// Kahn's algorithm over `nodes`, ignoring edges that leave the set.
///
/// Ready nodes are taken lowest `rank` first so the result is deterministic.
/// On failure, returns a cycle path (first node repeated at the end).
fn sort<R: Ord>(
    nodes: &[usize],
    dependencies: &[Vec<usize>],
    dependants: &[Vec<usize>],
    rank: impl Fn(usize) -> R,
) -> Result<Vec<usize>, Vec<usize>> {
    let members: BTreeSet<usize> = nodes.iter().copied().collect();
    let mut remaining: HashMap<usize, usize> = nodes
        .iter()
        .map(|&i| {
            let count = dependencies[i].iter().filter(|d| members.contains(d)).count();
            (i, count)
        })
        .collect();

    let mut ready: BTreeSet<(R, usize)> = remaining
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&i, _)| (rank(i), i))
        .collect();

    let mut sorted = Vec::with_capacity(nodes.len());
    while let Some((_, i)) = ready.pop_first() {
        sorted.push(i);
        for &dependant in &dependants[i] {
            if let Some(count) = remaining.get_mut(&dependant) {
                *count -= 1;
                if *count == 0 {
                    ready.insert((rank(dependant), dependant));
                }
            }
        }
    }

    if sorted.len() == members.len() {
        return Ok(sorted);
    }

    let done: BTreeSet<usize> = sorted.into_iter().collect();
    let stuck: Vec<usize> = members.difference(&done).copied().collect();
    Err(find_cycle(&stuck, dependencies))
}

fn find_cycle(candidates: &[usize], dependencies: &[Vec<usize>]) -> Vec<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    fn visit(
        node: usize,
        members: &BTreeSet<usize>,
        dependencies: &[Vec<usize>],
        marks: &mut HashMap<usize, Mark>,
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks.insert(node, Mark::OnStack);
        stack.push(node);

        for &dep in dependencies[node].iter().filter(|d| members.contains(d)) {
            match marks.get(&dep).copied().unwrap_or(Mark::Unvisited) {
                Mark::OnStack => {
                    let start = stack.iter().position(|&n| n == dep)?;
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(dep, members, dependencies, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let members: BTreeSet<usize> = candidates.iter().copied().collect();
    let mut marks = HashMap::new();
    let mut stack = Vec::new();

    for &start in candidates {
        if marks.get(&start).copied().unwrap_or(Mark::Unvisited) == Mark::Unvisited {
            if let Some(cycle) = visit(start, &members, dependencies, &mut marks, &mut stack) {
                return cycle;
            }
        }
    }

    candidates.to_vec()
}
