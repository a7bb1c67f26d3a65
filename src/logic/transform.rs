use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::error::MigrateError;
use crate::logic::diff::SchemaDelta;
use crate::model::{DatasetGraph, Id, Instance, MigrationSummary, SchemaSnapshot};

/// Context handed to custom transformation hooks: the snapshots on both sides
/// of the change and the alignment the differ computed.
pub struct TransformContext<'a> {
    pub existing: &'a SchemaSnapshot,
    pub migrated: &'a SchemaSnapshot,
    pub delta: &'a SchemaDelta,
}

/// Custom transformation for one schema change.
///
/// `pre_transform` runs before structural changes, `post_transform` after;
/// both receive the whole instance arena and return the arena to use.
/// The only contract is structural-identity preservation for instances the
/// hook does not touch. Default implementations pass instances through.
pub trait Transformation: Send + Sync {
    fn pre_transform(
        &self,
        instances: BTreeMap<Id, Instance>,
        _ctx: &TransformContext<'_>,
    ) -> anyhow::Result<BTreeMap<Id, Instance>> {
        Ok(instances)
    }

    fn post_transform(
        &self,
        instances: BTreeMap<Id, Instance>,
        _ctx: &TransformContext<'_>,
    ) -> anyhow::Result<BTreeMap<Id, Instance>> {
        Ok(instances)
    }
}

/// Resolves a descriptor's transformation reference to a hook implementation.
/// The registry is the narrow, typed loading mechanism: hooks are registered
/// by the embedding application under the key the descriptor names.
#[derive(Default, Clone)]
pub struct TransformationRegistry {
    inner: HashMap<String, Arc<dyn Transformation>>,
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, hook: Arc<dyn Transformation>) {
        self.inner.insert(key.into(), hook);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Transformation>> {
        self.inner.get(key).cloned()
    }
}

/// Applies one schema delta to one instance graph
pub struct DataTransformer;

impl DataTransformer {
    /// Rewrite the graph in place so it conforms to the `migrated` snapshot.
    ///
    /// Instances survive with unchanged identity unless their model was
    /// removed; every dropped instance and severed reference is recorded in
    /// the summary, never silent.
    pub fn apply(
        graph: &mut DatasetGraph,
        delta: &SchemaDelta,
        existing: &SchemaSnapshot,
        migrated: &SchemaSnapshot,
        hook: Option<&dyn Transformation>,
        summary: &mut MigrationSummary,
    ) -> Result<(), MigrateError> {
        // a type change has no default coercion rule
        if delta.requires_transformation() && hook.is_none() {
            let retyped: Vec<String> = delta
                .migrated
                .iter()
                .flat_map(|m| {
                    m.retyped_attrs
                        .iter()
                        .map(move |r| format!("{}.{}", m.existing_name, r.existing))
                })
                .collect();
            return Err(MigrateError::RenameAmbiguity(format!(
                "attribute type changed without a declared transformation: {}",
                retyped.join(", ")
            )));
        }

        let removed: HashSet<&String> = delta.removed_models.iter().collect();
        for instance in graph.instances.values() {
            if !removed.contains(&instance.model)
                && delta.migration_for(&instance.model).is_none()
            {
                return Err(MigrateError::Dataset(format!(
                    "instance '{}' has model '{}' unknown to the existing schema",
                    instance.id, instance.model
                )));
            }
        }

        let ctx = TransformContext {
            existing,
            migrated,
            delta,
        };

        let mut instances = std::mem::take(&mut graph.instances);
        if let Some(hook) = hook {
            instances = hook
                .pre_transform(instances, &ctx)
                .map_err(|e| MigrateError::Transformation(format!("pre_transform: {}", e)))?;
        }

        // drop instances of removed models
        let mut dropped_ids: HashSet<Id> = HashSet::new();
        for model in &delta.removed_models {
            let mut count = 0usize;
            instances.retain(|id, instance| {
                if &instance.model == model {
                    dropped_ids.insert(id.clone());
                    count += 1;
                    false
                } else {
                    true
                }
            });
            summary.record_dropped(model, count);
            if count > 0 {
                log::info!("dropped {} instance(s) of removed model '{}'", count, model);
            }
        }

        // restructure the survivors under the migrated schema
        let mut result: BTreeMap<Id, Instance> = BTreeMap::new();
        for (id, instance) in instances {
            let Some(migration) = delta.migration_for(&instance.model) else {
                // models the hook introduced beyond the alignment are kept as-is
                result.insert(id, instance);
                continue;
            };
            let existing_model = existing.get_model(&migration.existing_name);
            let migrated_model = migrated.get_model(&migration.migrated_name);

            let mut next = Instance::new(instance.id.clone(), migration.migrated_name.clone());
            let carried = migration
                .carried_attrs
                .iter()
                .map(|(old, new)| (old, new))
                .chain(
                    migration
                        .retyped_attrs
                        .iter()
                        .map(|r| (&r.existing, &r.migrated)),
                );
            for (old_attr, new_attr) in carried {
                let was_ref = existing_model
                    .and_then(|m| m.get_attribute(old_attr))
                    .map(|a| a.attr_type.is_ref())
                    .unwrap_or(false);
                let is_ref = migrated_model
                    .and_then(|m| m.get_attribute(new_attr))
                    .map(|a| a.attr_type.is_ref())
                    .unwrap_or(was_ref);
                match (was_ref, is_ref) {
                    (false, false) => {
                        if let Some(value) = instance.attributes.get(old_attr) {
                            next.attributes.insert(new_attr.clone(), value.clone());
                        }
                    }
                    (true, true) => {
                        if let Some(ids) = instance.references.get(old_attr) {
                            next.references.insert(new_attr.clone(), ids.clone());
                        }
                    }
                    // a kind change is a retype; the stored value is left to the hook
                    _ => {}
                }
            }
            for added in &migration.added_attrs {
                let is_ref = migrated_model
                    .and_then(|m| m.get_attribute(added))
                    .map(|a| a.attr_type.is_ref())
                    .unwrap_or(false);
                if is_ref {
                    next.references.insert(added.clone(), Vec::new());
                } else {
                    next.attributes.insert(added.clone(), serde_json::Value::Null);
                }
            }
            result.insert(id, next);
        }

        // never leave a reference pointing at a dropped identity
        let mut severed: BTreeMap<String, usize> = BTreeMap::new();
        for instance in result.values_mut() {
            for (attr, ids) in instance.references.iter_mut() {
                let before_len = ids.len();
                ids.retain(|id| !dropped_ids.contains(id));
                let cut = before_len - ids.len();
                if cut > 0 {
                    *severed.entry(attr.clone()).or_insert(0) += cut;
                }
            }
        }
        for (attr, count) in severed {
            summary.record_severed(&attr, count);
        }

        if let Some(hook) = hook {
            result = hook
                .post_transform(result, &ctx)
                .map_err(|e| MigrateError::Transformation(format!("post_transform: {}", e)))?;
        }

        graph.instances = result;
        Ok(())
    }
}
