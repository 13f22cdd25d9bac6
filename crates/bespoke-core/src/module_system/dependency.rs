use std::sync::Arc;

use thiserror::Error;

use crate::module_system::record::{DisableReason, ModuleRecord};
use crate::module_system::registry::RegistrySnapshot;

/// Error that can occur when resolving dependencies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// A declared dependency is not registered
    #[error("Required module not found: {dependency} (needed by {dependent})")]
    MissingModule { dependent: String, dependency: String },

    /// Dependency cycle detected
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

/// What a resolution pass found. Nothing in here is fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// `(dependent, missing dependency)` pairs
    pub missing: Vec<(String, String)>,
    /// Each detected cycle, in traversal order, first member repeated at the end
    pub cycles: Vec<Vec<String>>,
}

impl ResolutionReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.cycles.is_empty()
    }

    /// The findings as errors, for callers that want to surface them
    pub fn errors(&self) -> Vec<DependencyError> {
        let missing = self.missing.iter().map(|(dependent, dependency)| DependencyError::MissingModule {
            dependent: dependent.clone(),
            dependency: dependency.clone(),
        });
        let cycles = self.cycles.iter().cloned().map(DependencyError::CyclicDependency);
        missing.chain(cycles).collect()
    }
}

/// Assigns priorities so that every module outranks the modules that depend on it.
///
/// Bumping a record raises its priority by one and then bumps each declared
/// dependency, so a priority ends up counting the dependency paths that end
/// at the module. The traversal carries the stack of records being visited;
/// reaching a record already on the stack closes a cycle.
pub struct DependencyResolver<'a> {
    snapshot: &'a RegistrySnapshot,
    stack: Vec<String>,
    report: ResolutionReport,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(snapshot: &'a RegistrySnapshot) -> Self {
        Self {
            snapshot,
            stack: Vec::new(),
            report: ResolutionReport::default(),
        }
    }

    /// Bump every record in the snapshot once. Runs once per startup.
    pub fn resolve_all(mut self) -> ResolutionReport {
        let records: Vec<Arc<ModuleRecord>> = self.snapshot.iter().cloned().collect();
        for record in &records {
            self.bump(record);
        }
        self.finish()
    }

    /// Bump a single record, used when a module is added after startup.
    pub fn resolve_one(mut self, record: &Arc<ModuleRecord>) -> ResolutionReport {
        self.bump(record);
        self.finish()
    }

    fn finish(self) -> ResolutionReport {
        if !self.report.is_clean() {
            log::debug!(
                "Dependency resolution: {} missing, {} cycles",
                self.report.missing.len(),
                self.report.cycles.len()
            );
        }
        self.report
    }

    fn already_reported(&self, members: &[String]) -> bool {
        let mut key: Vec<&str> = members.iter().map(String::as_str).collect();
        key.sort_unstable();
        self.report.cycles.iter().any(|cycle| {
            let mut known: Vec<&str> = cycle[..cycle.len() - 1].iter().map(String::as_str).collect();
            known.sort_unstable();
            known == key
        })
    }

    fn bump(&mut self, record: &Arc<ModuleRecord>) {
        let identifier = record.identifier();

        if let Some(start) = self.stack.iter().position(|id| id == identifier) {
            let mut cycle: Vec<String> = self.stack[start..].to_vec();
            cycle.push(identifier.to_string());
            // The same cycle is reached again from each of its members
            if self.already_reported(&self.stack[start..]) {
                return;
            }
            log::warn!("{}", DependencyError::CyclicDependency(cycle.clone()));
            for member in &self.stack[start..] {
                if let Some(member) = self.snapshot.get(member) {
                    member.demote(DisableReason::DependencyCycle(cycle.clone()));
                }
            }
            self.report.cycles.push(cycle);
            return;
        }

        self.stack.push(identifier.to_string());
        record.bump_priority();

        for dependency in &record.metadata().dependencies {
            match self.snapshot.get(dependency) {
                Some(dep) => {
                    let dep = dep.clone();
                    self.bump(&dep);
                }
                None => {
                    log::info!(
                        "Disabling {} for lack of dependency: {}",
                        identifier,
                        dependency
                    );
                    record.demote(DisableReason::MissingDependency(dependency.clone()));
                    self.report
                        .missing
                        .push((identifier.to_string(), dependency.clone()));
                }
            }
        }

        self.stack.pop();
    }
}

/// Resolve priorities for every record of `snapshot`.
pub fn resolve_priorities(snapshot: &RegistrySnapshot) -> ResolutionReport {
    DependencyResolver::new(snapshot).resolve_all()
}

/// Resolve priorities starting from one record only.
pub fn resolve_record(snapshot: &RegistrySnapshot, record: &Arc<ModuleRecord>) -> ResolutionReport {
    DependencyResolver::new(snapshot).resolve_one(record)
}
