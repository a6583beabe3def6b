//! dependsOn ordering and cycle detection

use std::collections::HashSet;

use crate::CoreError;

/// Order `roots` and their transitive dependencies so that every property
/// comes after the properties it depends on.
///
/// `dependencies` returns the direct dependencies of a name (empty for unknown
/// names). A cycle is reported with the names along it, first name repeated
/// at the end.
pub fn order_by_dependencies<I, F>(roots: I, dependencies: F) -> Result<Vec<String>, CoreError>
where
    I: IntoIterator<Item = String>,
    F: Fn(&str) -> Vec<String>,
{
    let mut ordered = Vec::new();
    let mut visited = HashSet::new();
    let mut path = Vec::new();
    for root in roots {
        visit(&root, &dependencies, &mut visited, &mut path, &mut ordered)?;
    }
    Ok(ordered)
}

fn visit<F>(
    name: &str,
    dependencies: &F,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
    ordered: &mut Vec<String>,
) -> Result<(), CoreError>
where
    F: Fn(&str) -> Vec<String>,
{
    if let Some(start) = path.iter().position(|entry| entry == name) {
        let mut cycle = path[start..].to_vec();
        cycle.push(name.to_string());
        return Err(CoreError::DependencyCycle(cycle));
    }
    if visited.contains(name) {
        return Ok(());
    }

    path.push(name.to_string());
    for dependency in dependencies(name) {
        visit(&dependency, dependencies, visited, path, ordered)?;
    }
    path.pop();

    visited.insert(name.to_string());
    ordered.push(name.to_string());
    Ok(())
}
