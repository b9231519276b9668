use crate::object::{Inventory, SyncObject};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Ignore modification times and compare sizes only.
    pub size_only: bool,
}

/// The three command-ready partitions of a diff. `created` and `updated`
/// hold source objects, `deleted` holds target objects; ids present on both
/// sides with equal size and a target at least as fresh are omitted.
#[derive(Debug, Clone, Default)]
pub struct InventoryDiff {
    pub created: Vec<SyncObject>,
    pub updated: Vec<SyncObject>,
    pub deleted: Vec<SyncObject>,
}

impl InventoryDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Compare two inventories. The target counts as current for an id when it
/// is the same size and at least as fresh as the source; everything else is
/// an update. No content is read, so the comparison stays O(metadata).
pub fn diff(source: &Inventory, target: &Inventory, options: &DiffOptions) -> InventoryDiff {
    let mut result = InventoryDiff::default();

    for (id, src) in source {
        match target.get(id) {
            None => result.created.push(src.clone()),
            Some(tgt) => {
                if src.size != tgt.size {
                    result.updated.push(src.clone());
                } else if !options.size_only && tgt.last_modified < src.last_modified {
                    result.updated.push(src.clone());
                }
            }
        }
    }

    for (id, tgt) in target {
        if !source.contains_key(id) {
            result.deleted.push(tgt.clone());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn remote(entries: &[(&str, u64, u64)]) -> Inventory {
        entries
            .iter()
            .map(|(id, size, mtime)| {
                (
                    id.to_string(),
                    SyncObject::remote(*id, *size, *mtime, "bucket", *id),
                )
            })
            .collect()
    }

    fn local(entries: &[(&str, u64, u64)]) -> Inventory {
        entries
            .iter()
            .map(|(id, size, mtime)| {
                (
                    id.to_string(),
                    SyncObject::local(*id, *size, *mtime, format!("/data/{id}")),
                )
            })
            .collect()
    }

    fn ids(objects: &[SyncObject]) -> HashSet<String> {
        objects.iter().map(|o| o.id.clone()).collect()
    }

    #[test]
    fn classification_matrix() {
        let source = remote(&[
            ("abc/created", 1, 0),
            ("abc/updated1", 1, 1),
            ("abc/updated2", 2, 0),
            ("abc/unchanged", 1, 0),
        ]);
        let target = local(&[
            ("abc/unchanged", 1, 0),
            ("abc/updated1", 1, 0),
            ("abc/updated2", 1, 0),
            ("deleted", 1, 0),
        ]);

        let result = diff(&source, &target, &DiffOptions::default());
        assert_eq!(ids(&result.created), HashSet::from(["abc/created".into()]));
        assert_eq!(
            ids(&result.updated),
            HashSet::from(["abc/updated1".into(), "abc/updated2".into()])
        );
        assert_eq!(ids(&result.deleted), HashSet::from(["deleted".into()]));
    }

    #[test]
    fn fresher_target_is_unchanged() {
        let source = remote(&[("a", 1, 100)]);
        let target = local(&[("a", 1, 200)]);
        assert!(diff(&source, &target, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn size_only_ignores_mtime() {
        let source = remote(&[("stale", 1, 100), ("resized", 2, 0)]);
        let target = local(&[("stale", 1, 0), ("resized", 1, 0)]);

        let result = diff(&source, &target, &DiffOptions { size_only: true });
        assert_eq!(ids(&result.updated), HashSet::from(["resized".into()]));
        assert!(result.created.is_empty());
        assert!(result.deleted.is_empty());
    }

    #[test]
    fn partitions_the_union_of_ids() {
        let source = remote(&[("a", 1, 0), ("b", 2, 5), ("c", 3, 0), ("d", 1, 0)]);
        let target = local(&[("b", 2, 1), ("c", 1, 0), ("d", 1, 9), ("e", 4, 0)]);

        let result = diff(&source, &target, &DiffOptions::default());
        let created = ids(&result.created);
        let updated = ids(&result.updated);
        let deleted = ids(&result.deleted);

        assert!(created.is_disjoint(&updated));
        assert!(created.is_disjoint(&deleted));
        assert!(updated.is_disjoint(&deleted));

        let mut union: HashSet<String> = source.keys().cloned().collect();
        union.extend(target.keys().cloned());
        let unchanged: HashSet<String> = union
            .iter()
            .filter(|id| !created.contains(*id) && !updated.contains(*id) && !deleted.contains(*id))
            .cloned()
            .collect();
        assert_eq!(
            created.len() + updated.len() + deleted.len() + unchanged.len(),
            union.len()
        );
        assert_eq!(unchanged, HashSet::from(["d".into()]));
    }

    #[test]
    fn swapping_sides_swaps_created_and_deleted() {
        let source = remote(&[("only-src", 1, 0), ("both", 1, 0)]);
        let target = local(&[("only-tgt", 1, 0), ("both", 1, 0)]);

        let forward = diff(&source, &target, &DiffOptions::default());
        let backward = diff(&target, &source, &DiffOptions::default());
        assert_eq!(ids(&forward.created), ids(&backward.deleted));
        assert_eq!(ids(&forward.deleted), ids(&backward.created));
    }

    #[test]
    fn empty_inventories_diff_to_nothing() {
        let result = diff(&Inventory::new(), &Inventory::new(), &DiffOptions::default());
        assert!(result.is_empty());
    }
}
