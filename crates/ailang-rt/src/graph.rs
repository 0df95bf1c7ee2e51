//! Module dependency graph.
//!
//! The loader records every module and its import edges here, then asks
//! for a topological order to drive evaluation: leaves first, the root
//! module last, path-ordered tie-breaking for determinism. A cycle makes
//! ordering impossible; the error carries a concrete `A -> B -> ... -> A`
//! chain recovered from the modules the sort could not retire.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use rustc_hash::FxHashMap;

/// Index of a module within one load session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

#[derive(Debug)]
pub struct ModuleNode {
    pub id: ModuleId,
    /// The module path, e.g. `"t/fib"`.
    pub path: String,
    /// Modules this module imports.
    pub dependencies: Vec<ModuleId>,
}

/// A dependency cycle, as the chain of module paths that closes it.
#[derive(Debug, Clone)]
pub struct CycleError {
    pub cycle_path: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cycle_path.join(" -> "))
    }
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    pub modules: Vec<ModuleNode>,
    path_to_id: FxHashMap<String, ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module (idempotent per path) and return its id.
    pub fn add_module(&mut self, path: &str) -> ModuleId {
        if let Some(id) = self.path_to_id.get(path) {
            return *id;
        }
        let id = ModuleId(self.modules.len() as u32);
        self.path_to_id.insert(path.to_string(), id);
        self.modules.push(ModuleNode {
            id,
            path: path.to_string(),
            dependencies: Vec::new(),
        });
        id
    }

    pub fn resolve(&self, path: &str) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Record that `from` imports `to`. Self-edges and duplicates are
    /// dropped; a genuine self-import never reaches the graph because the
    /// loader's visiting stack rejects it first.
    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId) {
        if from == to {
            return;
        }
        let deps = &mut self.modules[from.0 as usize].dependencies;
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    pub fn get(&self, id: ModuleId) -> &ModuleNode {
        &self.modules[id.0 as usize]
    }
}

/// Order modules dependency-first.
///
/// Ready modules (no unretired dependencies) drain through a min-heap
/// keyed on the module path, so ties always resolve alphabetically and the
/// evaluation order is stable across runs. Dependent lists are precomputed
/// so retiring a module only touches the modules that import it. If the
/// heap drains before every module retires, the leftovers contain a cycle.
pub fn topological_sort(graph: &ModuleGraph) -> Result<Vec<ModuleId>, CycleError> {
    let n = graph.modules.len();
    let mut pending: Vec<usize> = Vec::with_capacity(n);
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, module) in graph.modules.iter().enumerate() {
        pending.push(module.dependencies.len());
        for dep in &module.dependencies {
            dependents[dep.0 as usize].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<(&str, usize)>> = (0..n)
        .filter(|&i| pending[i] == 0)
        .map(|i| Reverse((graph.modules[i].path.as_str(), i)))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse((_, i))) = ready.pop() {
        order.push(ModuleId(i as u32));
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push(Reverse((graph.modules[dependent].path.as_str(), dependent)));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(cycle_among(graph, &pending))
    }
}

/// Recover one concrete cycle from the modules the sort left behind.
///
/// Every unretired module waits on another unretired module, so following
/// unretired dependency edges must eventually revisit a module. Each step
/// records the module's position on the walk; the first repeat closes the
/// cycle, and its recorded position trims the lead-in so the chain starts
/// and ends on the same path.
fn cycle_among(graph: &ModuleGraph, pending: &[usize]) -> CycleError {
    let Some(mut current) = (0..pending.len()).find(|&i| pending[i] > 0) else {
        return CycleError {
            cycle_path: Vec::new(),
        };
    };

    let mut position: FxHashMap<usize, usize> = FxHashMap::default();
    let mut walk: Vec<usize> = Vec::new();
    loop {
        if let Some(&start) = position.get(&current) {
            let mut cycle_path: Vec<String> = walk[start..]
                .iter()
                .map(|&i| graph.modules[i].path.clone())
                .collect();
            cycle_path.push(graph.modules[current].path.clone());
            return CycleError { cycle_path };
        }
        position.insert(current, walk.len());
        walk.push(current);

        let next = graph.modules[current]
            .dependencies
            .iter()
            .find(|dep| pending[dep.0 as usize] > 0);
        match next {
            Some(dep) => current = dep.0 as usize,
            // Cannot happen while `pending[current] > 0`; return the walk
            // so the diagnostic still names the modules involved.
            None => {
                return CycleError {
                    cycle_path: walk
                        .iter()
                        .map(|&i| graph.modules[i].path.clone())
                        .collect(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(graph: &ModuleGraph, order: &[ModuleId]) -> Vec<String> {
        order.iter().map(|id| graph.get(*id).path.clone()).collect()
    }

    #[test]
    fn add_module_is_idempotent_per_path() {
        let mut graph = ModuleGraph::new();
        let a1 = graph.add_module("app/a");
        let a2 = graph.add_module("app/a");
        assert_eq!(a1, a2);
        assert_eq!(graph.modules.len(), 1);
    }

    #[test]
    fn linear_chain_orders_leaves_first() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module("a");
        let b = graph.add_module("b");
        let c = graph.add_module("c");
        graph.add_dependency(a, b);
        graph.add_dependency(b, c);
        let order = topological_sort(&graph).unwrap();
        assert_eq!(paths(&graph, &order), vec!["c", "b", "a"]);
    }

    #[test]
    fn independent_modules_sort_alphabetically() {
        let mut graph = ModuleGraph::new();
        graph.add_module("zeta");
        graph.add_module("alpha");
        graph.add_module("mid");
        let order = topological_sort(&graph).unwrap();
        assert_eq!(paths(&graph, &order), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn diamond_dependencies_resolve() {
        let mut graph = ModuleGraph::new();
        let root = graph.add_module("root");
        let left = graph.add_module("left");
        let right = graph.add_module("right");
        let base = graph.add_module("base");
        graph.add_dependency(root, left);
        graph.add_dependency(root, right);
        graph.add_dependency(left, base);
        graph.add_dependency(right, base);
        let order = topological_sort(&graph).unwrap();
        assert_eq!(paths(&graph, &order), vec!["base", "left", "right", "root"]);
    }

    #[test]
    fn three_cycle_reports_the_exact_chain() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module("A");
        let b = graph.add_module("B");
        let c = graph.add_module("C");
        graph.add_dependency(a, b);
        graph.add_dependency(b, c);
        graph.add_dependency(c, a);
        let err = topological_sort(&graph).unwrap_err();
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert!(err.cycle_path.len() >= 4);
        for name in ["A", "B", "C"] {
            assert!(err.cycle_path.contains(&name.to_string()));
        }
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module("A");
        let b = graph.add_module("B");
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);
        let err = topological_sort(&graph).unwrap_err();
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert!(err.cycle_path.contains(&"A".to_string()));
        assert!(err.cycle_path.contains(&"B".to_string()));
    }

    #[test]
    fn cycle_with_an_uninvolved_leaf_names_only_the_cycle() {
        // leaf retires fine; the chain must not include it.
        let mut graph = ModuleGraph::new();
        let a = graph.add_module("A");
        let b = graph.add_module("B");
        let leaf = graph.add_module("leaf");
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);
        graph.add_dependency(a, leaf);
        let err = topological_sort(&graph).unwrap_err();
        assert!(!err.cycle_path.contains(&"leaf".to_string()));
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
    }
}
