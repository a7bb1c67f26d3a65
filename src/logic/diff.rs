use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;
use crate::model::{AttrRename, AttrType, ModelRename, SchemaSnapshot};

/// Structural difference between two schema snapshots, expressed per model
/// and directly applicable by the data transformer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaDelta {
    /// Models with no `before` counterpart; no pre-existing instance can
    /// reference them
    pub added_models: Vec<String>,
    /// Models with no `after` counterpart; their instances are dropped
    pub removed_models: Vec<String>,
    /// Models aligned across the snapshots, by identity or declared rename
    pub migrated: Vec<ModelMigration>,
}

impl SchemaDelta {
    /// True when some attribute changed type or constraints, which no default
    /// coercion rule can absorb
    pub fn requires_transformation(&self) -> bool {
        self.migrated.iter().any(|m| !m.retyped_attrs.is_empty())
    }

    pub fn migration_for(&self, existing_model: &str) -> Option<&ModelMigration> {
        self.migrated
            .iter()
            .find(|m| m.existing_name == existing_model)
    }
}

/// Attribute-level classification for one aligned model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMigration {
    pub existing_name: String,
    pub migrated_name: String,
    /// Present only after; instances receive the unset value
    pub added_attrs: Vec<String>,
    /// Present only before; stored values are discarded
    pub removed_attrs: Vec<String>,
    /// Aligned with unchanged type and constraints: (old name, new name)
    pub carried_attrs: Vec<(String, String)>,
    /// Aligned but with a changed type or constraints: needs a transformation
    pub retyped_attrs: Vec<RetypedAttr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetypedAttr {
    pub existing: String,
    pub migrated: String,
}

/// Computes the structural delta between two schema snapshots, using manual
/// rename annotations to disambiguate.
pub struct SchemaDiffer;

impl SchemaDiffer {
    /// Diff `before` against `after`.
    ///
    /// Renames are applied as one simultaneous permutation — the alignment is
    /// built as a single old→new map, so swaps like `[["A","B"],["B","A"]]`
    /// align atomically instead of colliding under sequential substitution.
    pub fn diff(
        before: &SchemaSnapshot,
        after: &SchemaSnapshot,
        renamed_models: &[ModelRename],
        renamed_attributes: &[AttrRename],
    ) -> Result<SchemaDelta, MigrateError> {
        let mut errors = Vec::new();

        let models_map =
            Self::align_models(before, after, renamed_models, &mut errors);
        let attr_renames = Self::check_attr_renames(
            before,
            after,
            &models_map,
            renamed_attributes,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(MigrateError::RenameAmbiguity(errors.join("; ")));
        }

        let mapped_targets: HashSet<&String> = models_map.values().collect();
        let added_models: Vec<String> = after
            .models
            .iter()
            .filter(|m| !mapped_targets.contains(&m.name))
            .map(|m| m.name.clone())
            .collect();
        let removed_models: Vec<String> = before
            .models
            .iter()
            .filter(|m| !models_map.contains_key(&m.name))
            .map(|m| m.name.clone())
            .collect();

        let mut migrated = Vec::new();
        for existing_model in &before.models {
            let Some(migrated_name) = models_map.get(&existing_model.name) else {
                continue;
            };
            // alignment guarantees the target exists
            let migrated_model = after.get_model(migrated_name).unwrap();

            let declared: &BTreeMap<String, String> = attr_renames
                .get(&existing_model.name)
                .unwrap_or(&EMPTY_RENAMES);
            let declared_targets: HashSet<&String> = declared.values().collect();

            let mut added_attrs = Vec::new();
            let mut removed_attrs = Vec::new();
            let mut carried_attrs = Vec::new();
            let mut retyped_attrs = Vec::new();

            // align attributes: declared rename first, identity otherwise
            let mut attrs_map: BTreeMap<String, String> = BTreeMap::new();
            for attr in &existing_model.attributes {
                if let Some(target) = declared.get(&attr.name) {
                    attrs_map.insert(attr.name.clone(), target.clone());
                } else if migrated_model.has_attribute(&attr.name) {
                    if declared_targets.contains(&attr.name) {
                        return Err(MigrateError::RenameAmbiguity(format!(
                            "attribute '{}.{}' is both carried by name and the target of a rename",
                            existing_model.name, attr.name
                        )));
                    }
                    attrs_map.insert(attr.name.clone(), attr.name.clone());
                } else {
                    removed_attrs.push(attr.name.clone());
                }
            }

            let mapped_attr_targets: HashSet<&String> = attrs_map.values().collect();
            for attr in &migrated_model.attributes {
                if !mapped_attr_targets.contains(&attr.name) {
                    added_attrs.push(attr.name.clone());
                }
            }

            for (old_attr, new_attr) in &attrs_map {
                let existing_def = existing_model.get_attribute(old_attr).unwrap();
                let migrated_def = migrated_model.get_attribute(new_attr).unwrap();
                if Self::types_align(&existing_def.attr_type, &migrated_def.attr_type, &models_map)
                    && existing_def.required == migrated_def.required
                {
                    carried_attrs.push((old_attr.clone(), new_attr.clone()));
                } else {
                    retyped_attrs.push(RetypedAttr {
                        existing: old_attr.clone(),
                        migrated: new_attr.clone(),
                    });
                }
            }

            migrated.push(ModelMigration {
                existing_name: existing_model.name.clone(),
                migrated_name: migrated_name.clone(),
                added_attrs,
                removed_attrs,
                carried_attrs,
                retyped_attrs,
            });
        }

        Ok(SchemaDelta {
            added_models,
            removed_models,
            migrated,
        })
    }

    /// Whether two type tags match once model renames are accounted for: a
    /// reference whose target model was renamed is still the same attribute.
    fn types_align(old: &AttrType, new: &AttrType, models_map: &BTreeMap<String, String>) -> bool {
        match (old, new) {
            (
                AttrType::Ref {
                    target: old_target,
                    many: old_many,
                },
                AttrType::Ref {
                    target: new_target,
                    many: new_many,
                },
            ) => {
                old_many == new_many
                    && models_map
                        .get(old_target)
                        .map(|mapped| mapped == new_target)
                        .unwrap_or(old_target == new_target)
            }
            _ => old == new,
        }
    }

    /// Build the old→new model alignment as a single permutation, validating
    /// the declared renames against both snapshots.
    fn align_models(
        before: &SchemaSnapshot,
        after: &SchemaSnapshot,
        renamed_models: &[ModelRename],
        errors: &mut Vec<String>,
    ) -> BTreeMap<String, String> {
        let mut seen_old = HashSet::new();
        let mut seen_new = HashSet::new();
        for (old_name, new_name) in renamed_models {
            if !before.has_model(old_name) {
                errors.push(format!(
                    "renamed model '{}' is not defined in the existing schema",
                    old_name
                ));
            }
            if !after.has_model(new_name) {
                errors.push(format!(
                    "renamed model '{}' is not defined in the migrated schema",
                    new_name
                ));
            }
            if !seen_old.insert(old_name) {
                errors.push(format!("duplicate existing model '{}' in renamed_models", old_name));
            }
            if !seen_new.insert(new_name) {
                errors.push(format!("duplicate migrated model '{}' in renamed_models", new_name));
            }
        }

        let mut models_map = BTreeMap::new();
        for model in &before.models {
            if let Some((_, new_name)) = renamed_models.iter().find(|(old, _)| old == &model.name) {
                models_map.insert(model.name.clone(), new_name.clone());
            } else if after.has_model(&model.name) {
                if seen_new.contains(&model.name) {
                    errors.push(format!(
                        "model '{}' is both carried by name and the target of a rename",
                        model.name
                    ));
                } else {
                    models_map.insert(model.name.clone(), model.name.clone());
                }
            }
        }
        models_map
    }

    /// Validate attribute renames and group them per existing model
    fn check_attr_renames(
        before: &SchemaSnapshot,
        after: &SchemaSnapshot,
        models_map: &BTreeMap<String, String>,
        renamed_attributes: &[AttrRename],
        errors: &mut Vec<String>,
    ) -> HashMap<String, BTreeMap<String, String>> {
        let mut grouped: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        let mut seen_new: HashSet<(String, String)> = HashSet::new();

        for ((old_model, old_attr), (new_model, new_attr)) in renamed_attributes {
            match models_map.get(old_model) {
                Some(mapped) if mapped == new_model => {}
                _ => {
                    errors.push(format!(
                        "attribute rename (('{}', '{}'), ('{}', '{}')) is inconsistent with the model alignment",
                        old_model, old_attr, new_model, new_attr
                    ));
                    continue;
                }
            }
            let exists_before = before
                .get_model(old_model)
                .map(|m| m.has_attribute(old_attr))
                .unwrap_or(false);
            if !exists_before {
                errors.push(format!(
                    "renamed attribute '{}.{}' is not defined in the existing schema",
                    old_model, old_attr
                ));
                continue;
            }
            let exists_after = after
                .get_model(new_model)
                .map(|m| m.has_attribute(new_attr))
                .unwrap_or(false);
            if !exists_after {
                errors.push(format!(
                    "renamed attribute '{}.{}' is not defined in the migrated schema",
                    new_model, new_attr
                ));
                continue;
            }
            if !seen_new.insert((new_model.clone(), new_attr.clone())) {
                errors.push(format!(
                    "duplicate migrated attribute '{}.{}' in renamed_attributes",
                    new_model, new_attr
                ));
                continue;
            }
            if grouped
                .entry(old_model.clone())
                .or_default()
                .insert(old_attr.clone(), new_attr.clone())
                .is_some()
            {
                errors.push(format!(
                    "duplicate existing attribute '{}.{}' in renamed_attributes",
                    old_model, old_attr
                ));
            }
        }
        grouped
    }
}

static EMPTY_RENAMES: BTreeMap<String, String> = BTreeMap::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrType, AttributeDef, ModelDef};

    fn model(name: &str, attrs: &[(&str, AttrType)]) -> ModelDef {
        ModelDef::new(
            name,
            attrs
                .iter()
                .map(|(attr_name, attr_type)| AttributeDef::new(*attr_name, attr_type.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_identity_alignment_with_changes() {
        let before = SchemaSnapshot::new(vec![model(
            "Bike",
            &[("price", AttrType::Int), ("color", AttrType::String)],
        )]);
        let after = SchemaSnapshot::new(vec![model(
            "Bike",
            &[("price", AttrType::Int), ("weight", AttrType::Float)],
        )]);

        let delta = SchemaDiffer::diff(&before, &after, &[], &[]).unwrap();
        assert!(delta.added_models.is_empty());
        assert!(delta.removed_models.is_empty());
        let migration = delta.migration_for("Bike").unwrap();
        assert_eq!(migration.added_attrs, vec!["weight".to_string()]);
        assert_eq!(migration.removed_attrs, vec!["color".to_string()]);
        assert_eq!(
            migration.carried_attrs,
            vec![("price".to_string(), "price".to_string())]
        );
        assert!(!delta.requires_transformation());
    }

    #[test]
    fn test_model_rename_aligns() {
        let before = SchemaSnapshot::new(vec![model("Test", &[("size", AttrType::Float)])]);
        let after = SchemaSnapshot::new(vec![model("ChangedTest", &[("size", AttrType::Float)])]);

        let delta = SchemaDiffer::diff(
            &before,
            &after,
            &[("Test".to_string(), "ChangedTest".to_string())],
            &[],
        )
        .unwrap();
        assert!(delta.added_models.is_empty());
        assert!(delta.removed_models.is_empty());
        let migration = delta.migration_for("Test").unwrap();
        assert_eq!(migration.migrated_name, "ChangedTest");
        assert_eq!(
            migration.carried_attrs,
            vec![("size".to_string(), "size".to_string())]
        );
    }

    #[test]
    fn test_swap_is_atomic() {
        let before = SchemaSnapshot::new(vec![
            model("A", &[("x", AttrType::Int)]),
            model("B", &[("y", AttrType::Int)]),
        ]);
        let after = SchemaSnapshot::new(vec![
            model("A", &[("y", AttrType::Int)]),
            model("B", &[("x", AttrType::Int)]),
        ]);

        let renames = vec![
            ("A".to_string(), "B".to_string()),
            ("B".to_string(), "A".to_string()),
        ];
        let delta = SchemaDiffer::diff(&before, &after, &renames, &[]).unwrap();

        // old-A → new-B and old-B → new-A, atomically
        let a_migration = delta.migration_for("A").unwrap();
        assert_eq!(a_migration.migrated_name, "B");
        assert_eq!(
            a_migration.carried_attrs,
            vec![("x".to_string(), "x".to_string())]
        );
        let b_migration = delta.migration_for("B").unwrap();
        assert_eq!(b_migration.migrated_name, "A");
        assert!(delta.added_models.is_empty());
        assert!(delta.removed_models.is_empty());
    }

    #[test]
    fn test_added_and_removed_models() {
        let before = SchemaSnapshot::new(vec![model("Old", &[])]);
        let after = SchemaSnapshot::new(vec![model("New", &[])]);

        let delta = SchemaDiffer::diff(&before, &after, &[], &[]).unwrap();
        assert_eq!(delta.removed_models, vec!["Old".to_string()]);
        assert_eq!(delta.added_models, vec!["New".to_string()]);
        assert!(delta.migrated.is_empty());
    }

    #[test]
    fn test_attribute_rename() {
        let before = SchemaSnapshot::new(vec![model("B", &[("x", AttrType::Int)])]);
        let after = SchemaSnapshot::new(vec![model("B", &[("y", AttrType::Int)])]);

        let attr_renames = vec![(
            ("B".to_string(), "x".to_string()),
            ("B".to_string(), "y".to_string()),
        )];
        let delta = SchemaDiffer::diff(&before, &after, &[], &attr_renames).unwrap();
        let migration = delta.migration_for("B").unwrap();
        assert_eq!(
            migration.carried_attrs,
            vec![("x".to_string(), "y".to_string())]
        );
        assert!(migration.added_attrs.is_empty());
        assert!(migration.removed_attrs.is_empty());
    }

    #[test]
    fn test_ref_target_follows_model_rename() {
        let before = SchemaSnapshot::new(vec![
            model("Test", &[("size", AttrType::Float)]),
            model(
                "Holder",
                &[(
                    "held",
                    AttrType::Ref {
                        target: "Test".to_string(),
                        many: true,
                    },
                )],
            ),
        ]);
        let after = SchemaSnapshot::new(vec![
            model("ChangedTest", &[("size", AttrType::Float)]),
            model(
                "Holder",
                &[(
                    "held",
                    AttrType::Ref {
                        target: "ChangedTest".to_string(),
                        many: true,
                    },
                )],
            ),
        ]);

        let delta = SchemaDiffer::diff(
            &before,
            &after,
            &[("Test".to_string(), "ChangedTest".to_string())],
            &[],
        )
        .unwrap();
        // the reference attribute is carried, not retyped: its target change
        // is the declared model rename itself
        let holder = delta.migration_for("Holder").unwrap();
        assert_eq!(
            holder.carried_attrs,
            vec![("held".to_string(), "held".to_string())]
        );
        assert!(holder.retyped_attrs.is_empty());
        assert!(!delta.requires_transformation());
    }

    #[test]
    fn test_type_change_classified() {
        let before = SchemaSnapshot::new(vec![model("Test", &[("size", AttrType::Float)])]);
        let after = SchemaSnapshot::new(vec![model("Test", &[("size", AttrType::Int)])]);

        let delta = SchemaDiffer::diff(&before, &after, &[], &[]).unwrap();
        let migration = delta.migration_for("Test").unwrap();
        assert_eq!(migration.retyped_attrs.len(), 1);
        assert_eq!(migration.retyped_attrs[0].existing, "size");
        assert!(delta.requires_transformation());
    }

    #[test]
    fn test_unknown_rename_source_rejected() {
        let before = SchemaSnapshot::new(vec![model("A", &[])]);
        let after = SchemaSnapshot::new(vec![model("B", &[])]);

        let err = SchemaDiffer::diff(
            &before,
            &after,
            &[("Missing".to_string(), "B".to_string())],
            &[],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not defined in the existing schema"));
    }

    #[test]
    fn test_duplicate_rename_target_rejected() {
        let before = SchemaSnapshot::new(vec![model("A", &[]), model("B", &[])]);
        let after = SchemaSnapshot::new(vec![model("C", &[])]);

        let renames = vec![
            ("A".to_string(), "C".to_string()),
            ("B".to_string(), "C".to_string()),
        ];
        let err = SchemaDiffer::diff(&before, &after, &renames, &[]).unwrap_err();
        assert!(err.to_string().contains("duplicate migrated model"));
    }

    #[test]
    fn test_carried_name_colliding_with_rename_target_rejected() {
        let before = SchemaSnapshot::new(vec![model("A", &[]), model("B", &[])]);
        let after = SchemaSnapshot::new(vec![model("B", &[])]);

        // A→B while the old B would also carry to B by name
        let renames = vec![("A".to_string(), "B".to_string())];
        let err = SchemaDiffer::diff(&before, &after, &renames, &[]).unwrap_err();
        assert!(err.to_string().contains("both carried by name"));
    }

    #[test]
    fn test_attr_rename_inconsistent_with_model_map_rejected() {
        let before = SchemaSnapshot::new(vec![model("A", &[("x", AttrType::Int)])]);
        let after = SchemaSnapshot::new(vec![model("A", &[("x", AttrType::Int)])]);

        let attr_renames = vec![(
            ("A".to_string(), "x".to_string()),
            ("Other".to_string(), "x".to_string()),
        )];
        let err = SchemaDiffer::diff(&before, &after, &[], &attr_renames).unwrap_err();
        assert!(err.to_string().contains("inconsistent with the model alignment"));
    }
}
