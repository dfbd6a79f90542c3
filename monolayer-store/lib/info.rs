use std::collections::HashMap;

use chrono::{DateTime, Utc};
use getset::Getters;
use oci_spec::image::Digest;
use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The fieldpath that addresses the whole label map in [`ContentStore::update`][crate::ContentStore::update].
pub const LABELS_FIELDPATH: &str = "labels";

/// The prefix of fieldpaths that address a single label, e.g. `labels.monolayer.io/uncompressed`.
pub const LABEL_FIELDPATH_PREFIX: &str = "labels.";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Metadata the store keeps about a committed blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// The digest of the blob.
    pub digest: Digest,

    /// The size of the blob in bytes.
    pub size: u64,

    /// When the blob was first committed.
    pub created_at: DateTime<Utc>,

    /// When the blob metadata was last changed.
    pub updated_at: DateTime<Utc>,

    /// User-defined labels attached to the blob.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// The progress of a write that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Status {
    /// The reference the write is staged under.
    pub(crate) reference: String,

    /// The number of bytes staged so far.
    pub(crate) offset: u64,

    /// When the write was started.
    pub(crate) started_at: DateTime<Utc>,

    /// When bytes were last staged.
    pub(crate) updated_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Applies the label changes selected by `fieldpaths` from `update` onto `labels`.
///
/// - No fieldpaths, or the `labels` fieldpath, replaces the whole map.
/// - `labels.<key>` sets that one key from `update`, or removes it when `update` has no value or
///   an empty one.
pub(crate) fn apply_label_update(
    labels: &mut HashMap<String, String>,
    update: &HashMap<String, String>,
    fieldpaths: &[String],
) -> StoreResult<()> {
    if fieldpaths.is_empty() {
        *labels = update.clone();
        return Ok(());
    }

    for path in fieldpaths {
        if path == LABELS_FIELDPATH {
            *labels = update.clone();
        } else if let Some(key) = path.strip_prefix(LABEL_FIELDPATH_PREFIX) {
            match update.get(key).filter(|value| !value.is_empty()) {
                Some(value) => {
                    labels.insert(key.to_string(), value.clone());
                }
                None => {
                    labels.remove(key);
                }
            }
        } else {
            return Err(StoreError::InvalidArgument(format!(
                "cannot update {path:?} field on content info"
            )));
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_apply_label_update_single_key_leaves_others() -> anyhow::Result<()> {
        let mut current = labels(&[("a", "1"), ("b", "2")]);
        let update = labels(&[("b", "3"), ("c", "4")]);

        apply_label_update(&mut current, &update, &["labels.b".to_string()])?;

        assert_eq!(current, labels(&[("a", "1"), ("b", "3")]));
        Ok(())
    }

    #[test]
    fn test_apply_label_update_empty_value_removes_key() -> anyhow::Result<()> {
        let mut current = labels(&[("a", "1")]);

        apply_label_update(&mut current, &labels(&[("a", "")]), &["labels.a".to_string()])?;

        assert!(current.is_empty());
        Ok(())
    }

    #[test]
    fn test_apply_label_update_without_fieldpaths_replaces_all() -> anyhow::Result<()> {
        let mut current = labels(&[("a", "1")]);

        apply_label_update(&mut current, &labels(&[("z", "9")]), &[])?;

        assert_eq!(current, labels(&[("z", "9")]));
        Ok(())
    }

    #[test]
    fn test_apply_label_update_rejects_unknown_field() {
        let mut current = HashMap::new();
        let result = apply_label_update(&mut current, &HashMap::new(), &["size".to_string()]);
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }
}
