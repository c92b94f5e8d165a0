use std::collections::BTreeSet;

use indexmap::IndexSet;
use serde::Serialize;
use tracing::debug;

use crate::domain::{DataType, Scope, ScopeKey};
use crate::registry::{DataRegistry, is_reserved};

/// Basic mode discovers every source in the registry; advanced mode takes
/// an explicit source list from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Basic,
    Advanced,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Basic => "basic",
            Mode::Advanced => "advanced",
        }
    }
}

/// Scopes the user allowed through the `scope` parameter. `None` means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter(Option<BTreeSet<Scope>>);

impl ScopeFilter {
    pub fn unrestricted() -> Self {
        Self(None)
    }

    pub fn only(scopes: impl IntoIterator<Item = Scope>) -> Self {
        let scopes: BTreeSet<Scope> = scopes.into_iter().collect();
        if scopes.is_empty() {
            Self(None)
        } else {
            Self(Some(scopes))
        }
    }

    pub fn allows(&self, scope: Scope) -> bool {
        self.0.as_ref().is_none_or(|scopes| scopes.contains(&scope))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceSlot {
    pub source: DataType,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunedSlot {
    pub key: ScopeKey,
    pub data_type: DataType,
}

/// Unique `(source, scope)` pairs present in the registry. Sample types come
/// first in order of appearance, then project types.
pub fn discover(registry: &DataRegistry, filter: &ScopeFilter) -> IndexSet<SourceSlot> {
    let mut found = IndexSet::new();
    if filter.allows(Scope::Sample) {
        for slots in registry.samples.values() {
            for tag in slots.keys().filter(|tag| !is_reserved(tag)) {
                found.insert(SourceSlot {
                    source: DataType::new(tag.as_str()),
                    scope: Scope::Sample,
                });
            }
        }
    }
    if filter.allows(Scope::Project) {
        for tag in registry.project_data.keys().filter(|tag| !is_reserved(tag)) {
            found.insert(SourceSlot {
                source: DataType::new(tag.as_str()),
                scope: Scope::Project,
            });
        }
    }
    debug!(count = found.len(), "discovered source slots");
    found
}

/// Removes every non-reserved type that is not among `keep` for its scope.
/// Destructive: the registry no longer carries the pruned slots afterwards.
pub fn prune(registry: &mut DataRegistry, keep: &IndexSet<SourceSlot>) -> Vec<PrunedSlot> {
    let mut pruned = Vec::new();
    let keys = registry
        .keys_for(Scope::Sample)
        .into_iter()
        .chain(std::iter::once(ScopeKey::Project))
        .collect::<Vec<_>>();

    for key in keys {
        let scope = key.scope();
        let Some(slots) = registry.slots_mut(&key) else {
            continue;
        };
        slots.retain(|tag, _| {
            let slot = SourceSlot {
                source: DataType::new(tag.as_str()),
                scope,
            };
            if is_reserved(tag) || keep.contains(&slot) {
                return true;
            }
            pruned.push(PrunedSlot {
                key: key.clone(),
                data_type: slot.source,
            });
            false
        });
    }

    for slot in &pruned {
        debug!(key = %slot.key, data_type = %slot.data_type, "pruned unrequested slot");
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DataRegistry {
        DataRegistry::from_json_str(
            r#"{
                "title": "proj",
                "project_data": {"fasta.nucl": "/ref.fa", "type": "x"},
                "samples": {
                    "A": {"type": "PE", "fastq.F": "/A_1.fq", "fastq.R": "/A_2.fq"},
                    "B": {"fastq.F": "/B_1.fq", "bam": "/B.bam"}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn discovers_unique_pairs_in_order() {
        let found = discover(&registry(), &ScopeFilter::unrestricted());
        let names = found
            .iter()
            .map(|slot| format!("{}:{}", slot.source, slot.scope))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "fastq.F:sample",
                "fastq.R:sample",
                "bam:sample",
                "fasta.nucl:project"
            ]
        );
    }

    #[test]
    fn filter_restricts_scopes() {
        let found = discover(&registry(), &ScopeFilter::only([Scope::Project]));
        assert_eq!(found.len(), 1);
        assert!(ScopeFilter::only([]).allows(Scope::Sample));
    }

    #[test]
    fn prune_drops_types_outside_kept_set() {
        let mut registry = registry();
        let keep = discover(&registry, &ScopeFilter::only([Scope::Sample]));
        let pruned = prune(&mut registry, &keep);

        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].key, ScopeKey::Project);
        assert!(!registry.in_project(&DataType::from("fasta.nucl")));
        assert!(registry.project_data.contains_key("type"));
        assert!(registry.in_any_sample(&DataType::from("bam")));
    }
}
