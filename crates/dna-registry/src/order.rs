//! Deterministic build ordering.
//!
//! Kahn's algorithm over the resolved set, with edges directed from a
//! dependency to its dependent. Zero in-degree nodes are drained from a
//! FIFO queue seeded in resolution order, so a fixed resolved set always
//! produces the same build order. When Kahn's algorithm stalls, an
//! iterative depth-first search reports the ids forming the cycle.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::module::Module;

/// Adjacency over a module slice, by index.
struct DependencyGraph {
    /// `dependents[i]` lists modules that depend on module `i`.
    dependents: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    fn build(modules: &[Arc<Module>]) -> Self {
        let index: HashMap<&str, usize> = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.as_str(), i))
            .collect();

        let mut dependents = vec![Vec::new(); modules.len()];
        let mut in_degree = vec![0; modules.len()];

        for (i, module) in modules.iter().enumerate() {
            for dep in &module.dependencies {
                // Edges to modules outside the set do not constrain ordering.
                if let Some(&d) = index.get(dep.module_id.as_str()) {
                    dependents[d].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        DependencyGraph {
            dependents,
            in_degree,
        }
    }

    /// Find one cycle among the nodes still carrying in-degree after Kahn.
    ///
    /// Iterative DFS with an explicit `(node, next child)` stack.
    fn find_cycle(&self, remaining: &[bool]) -> Vec<usize> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut color = vec![WHITE; self.dependents.len()];

        for start in 0..self.dependents.len() {
            if !remaining[start] || color[start] != WHITE {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            color[start] = GRAY;

            while let Some(&(node, next)) = stack.last() {
                if let Some(&child) = self.dependents[node].get(next) {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if !remaining[child] {
                        continue;
                    }
                    match color[child] {
                        WHITE => {
                            color[child] = GRAY;
                            stack.push((child, 0));
                        }
                        GRAY => {
                            let from = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
                            let mut cycle: Vec<usize> = stack[from..].iter().map(|&(n, _)| n).collect();
                            cycle.push(child);
                            return cycle;
                        }
                        _ => {}
                    }
                } else {
                    color[node] = BLACK;
                    stack.pop();
                }
            }
        }
        Vec::new()
    }
}

/// Order `modules` so every dependency precedes its dependents.
///
/// Fails with [`RegistryError::CircularDependency`] naming the cycle when
/// no complete order exists.
pub fn order(modules: &[Arc<Module>]) -> Result<Vec<Arc<Module>>> {
    let graph = DependencyGraph::build(modules);
    let mut in_degree = graph.in_degree.clone();

    let mut queue: VecDeque<usize> = (0..modules.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut ordered = Vec::with_capacity(modules.len());

    while let Some(node) = queue.pop_front() {
        ordered.push(node);
        for &dependent in &graph.dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if ordered.len() < modules.len() {
        let remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
        let cycle = graph
            .find_cycle(&remaining)
            .into_iter()
            .map(|i| modules[i].id.clone())
            .collect();
        return Err(RegistryError::CircularDependency { cycle });
    }

    Ok(ordered.into_iter().map(|i| modules[i].clone()).collect())
}

/// Module ids in build order.
pub fn dependency_order(modules: &[Arc<Module>]) -> Result<Vec<String>> {
    Ok(order(modules)?.into_iter().map(|m| m.id.clone()).collect())
}
