//! Ordering of deploy tasks over the static dependency graph

use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;

use crate::{address_book::AddressBook, errors::ScriptError, types::TaskSpec};

/// The static set of deployable tasks, keyed by name
#[derive(Clone, Debug, Default)]
pub struct TaskGraph {
    /// The tasks
    tasks: BTreeMap<String, TaskSpec>,
}

impl TaskGraph {
    /// Build a graph from a list of tasks, rejecting duplicate names
    pub fn new(tasks: impl IntoIterator<Item = TaskSpec>) -> Result<Self, ScriptError> {
        let mut graph = Self::default();
        for task in tasks {
            graph.register(task)?;
        }
        Ok(graph)
    }

    /// Add a task to the graph
    pub fn register(&mut self, task: TaskSpec) -> Result<(), ScriptError> {
        if self.tasks.contains_key(&task.name) {
            return Err(ScriptError::config(format!(
                "task `{}` is defined twice",
                task.name
            )));
        }
        self.tasks.insert(task.name.clone(), task);
        Ok(())
    }

    /// Look up a task by name
    pub fn get(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    /// The names of all tasks
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }
}

/// A task scheduled by the planner
#[derive(Clone, Copy, Debug)]
pub struct PlannedTask<'g> {
    /// The task
    pub spec: &'g TaskSpec,
    /// Whether the address book already holds a record for the task, making
    /// its deploy step a no-op
    pub already_deployed: bool,
}

/// Compute the order in which to execute `target` and its transitive
/// dependencies.
///
/// Every dependency appears strictly before its dependents and each task
/// appears exactly once. Tasks marked `run_at_end` are moved after all other
/// tasks, keeping their relative dependency order.
pub fn plan<'g>(target: &str, graph: &'g TaskGraph) -> Result<Vec<&'g TaskSpec>, ScriptError> {
    let mut visit = Visit {
        graph,
        stack: Vec::new(),
        done: HashSet::new(),
        order: Vec::new(),
    };
    visit.visit(target, None)?;

    let (deferred, immediate): (Vec<_>, Vec<_>) =
        visit.order.into_iter().partition(|t| t.run_at_end);

    // Deferring a task that something non-deferred needs would break the order
    for task in &immediate {
        if let Some(dep) = task
            .dependencies
            .iter()
            .find(|d| graph.get(d).is_some_and(|t| t.run_at_end))
        {
            return Err(ScriptError::config(format!(
                "task `{}` depends on `{dep}`, which only runs at the end",
                task.name
            )));
        }
    }

    Ok(immediate.into_iter().chain(deferred).collect())
}

/// Plan `target` and mark the tasks already recorded for the network
pub fn plan_against<'g>(
    target: &str,
    graph: &'g TaskGraph,
    book: &AddressBook,
    network_id: &str,
) -> Result<Vec<PlannedTask<'g>>, ScriptError> {
    Ok(plan(target, graph)?
        .into_iter()
        .map(|spec| PlannedTask {
            spec,
            already_deployed: book.get(network_id, &spec.name).is_some(),
        })
        .collect())
}

/// The state of a depth-first post-order traversal
struct Visit<'g> {
    /// The graph being traversed
    graph: &'g TaskGraph,
    /// The tasks currently being visited, outermost first
    stack: Vec<&'g str>,
    /// The tasks whose dependency closure has been scheduled
    done: HashSet<&'g str>,
    /// The post-order
    order: Vec<&'g TaskSpec>,
}

impl<'g> Visit<'g> {
    /// Schedule `name` after its dependencies
    fn visit(&mut self, name: &str, required_by: Option<&str>) -> Result<(), ScriptError> {
        let task = self.graph.get(name).ok_or_else(|| match required_by {
            Some(parent) => ScriptError::config(format!(
                "task `{parent}` depends on unknown task `{name}`"
            )),
            None => ScriptError::config(format!("unknown task `{name}`")),
        })?;
        let name = task.name.as_str();

        if self.done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = self.stack.iter().position(|t| *t == name) {
            let cycle = self.stack[pos..].iter().chain([&name]).join(" -> ");
            return Err(ScriptError::config(format!("cyclic dependency: {cycle}")));
        }

        self.stack.push(name);
        for dep in &task.dependencies {
            self.visit(dep, Some(name))?;
        }
        self.stack.pop();

        self.done.insert(name);
        self.order.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256};

    use super::*;
    use crate::types::{ArgsContext, ConstructorArgs, DeploymentRecord};

    fn no_args(_: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
        Ok(vec![])
    }

    fn task(name: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec::new(name, no_args).depends_on(deps)
    }

    fn names(order: &[&TaskSpec]) -> Vec<String> {
        order.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let graph = TaskGraph::new([
            task("Admin", &["Roles", "Fund"]),
            task("Fund", &["Roles"]),
            task("Roles", &[]),
        ])
        .unwrap();

        let order = plan("Admin", &graph).unwrap();
        assert_eq!(names(&order), ["Roles", "Fund", "Admin"]);
    }

    #[test]
    fn test_diamond_is_scheduled_once() {
        let graph = TaskGraph::new([
            task("Roles", &[]),
            task("Fund", &["Roles"]),
            task("Lending", &["Roles", "Fund"]),
            task("MarginRouter", &["Roles", "Fund"]),
            task("DependencyController", &["Lending", "MarginRouter", "Fund"]),
        ])
        .unwrap();

        let order = names(&plan("DependencyController", &graph).unwrap());
        assert_eq!(
            order,
            ["Roles", "Fund", "Lending", "MarginRouter", "DependencyController"]
        );
    }

    #[test]
    fn test_every_dependency_precedes_its_dependent() {
        let graph = TaskGraph::new([
            task("A", &["B", "C"]),
            task("B", &["D"]),
            task("C", &["D", "E"]),
            task("D", &["E"]),
            task("E", &[]),
        ])
        .unwrap();

        let order = plan("A", &graph).unwrap();
        for (i, t) in order.iter().enumerate() {
            for dep in &t.dependencies {
                let dep_pos = order.iter().position(|o| &o.name == dep).unwrap();
                assert!(dep_pos < i, "{dep} scheduled after {}", t.name);
            }
        }
    }

    #[test]
    fn test_cycle_is_named() {
        let graph = TaskGraph::new([
            task("Root", &["A"]),
            task("A", &["B"]),
            task("B", &["C"]),
            task("C", &["A"]),
        ])
        .unwrap();

        for root in ["Root", "A", "B", "C"] {
            match plan(root, &graph) {
                Err(ScriptError::Configuration(msg)) => {
                    assert!(msg.contains("cyclic"), "{msg}");
                    assert!(["A", "B", "C"].iter().any(|t| msg.contains(t)), "{msg}");
                }
                other => panic!("expected a cycle error from {root}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = TaskGraph::new([task("Roles", &["Roles"])]).unwrap();
        assert!(matches!(
            plan("Roles", &graph),
            Err(ScriptError::Configuration(msg)) if msg.contains("Roles -> Roles")
        ));
    }

    #[test]
    fn test_unknown_tasks() {
        let graph = TaskGraph::new([task("Fund", &["Roles"])]).unwrap();
        assert!(matches!(
            plan("Fund", &graph),
            Err(ScriptError::Configuration(msg)) if msg.contains("`Roles`")
        ));
        assert!(matches!(plan("Lending", &graph), Err(ScriptError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        assert!(TaskGraph::new([task("Roles", &[]), task("Roles", &[])]).is_err());
    }

    #[test]
    fn test_run_at_end_is_deferred() {
        let graph = TaskGraph::new([
            task("Roles", &[]),
            task("Activation", &["Roles"]).at_end(),
            task("Migration", &["Activation"]).at_end(),
            task("Fund", &["Roles"]),
            task("Everything", &["Migration", "Fund"]).at_end(),
        ])
        .unwrap();

        let order = names(&plan("Everything", &graph).unwrap());
        assert_eq!(order, ["Roles", "Fund", "Activation", "Migration", "Everything"]);
    }

    #[test]
    fn test_depending_on_deferred_task_rejected() {
        let graph = TaskGraph::new([
            task("Activation", &[]).at_end(),
            task("Fund", &["Activation"]),
        ])
        .unwrap();
        assert!(matches!(plan("Fund", &graph), Err(ScriptError::Configuration(_))));
    }

    #[test]
    fn test_plan_against_marks_deployed_tasks() {
        let graph = TaskGraph::new([task("Roles", &[]), task("Fund", &["Roles"])]).unwrap();
        let mut book = AddressBook::in_memory();
        book.put(
            "kovan",
            DeploymentRecord {
                logical_name: "Roles".to_string(),
                network_id: "kovan".to_string(),
                address: Address::repeat_byte(1),
                constructor_args_hash: B256::ZERO,
                deployed_at_block: None,
                tx_hash: None,
                artifact: None,
            },
        )
        .unwrap();

        let planned = plan_against("Fund", &graph, &book, "kovan").unwrap();
        let marks: Vec<_> = planned
            .iter()
            .map(|p| (p.spec.name.as_str(), p.already_deployed))
            .collect();
        assert_eq!(marks, [("Roles", true), ("Fund", false)]);
    }
}
