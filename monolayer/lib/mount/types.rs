use getset::Getters;
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The mount type of overlay filesystems.
pub const MOUNT_TYPE_OVERLAY: &str = "overlay";

/// The mount type of bind mounts.
pub const MOUNT_TYPE_BIND: &str = "bind";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A single mount specification.
///
/// ## Example
///
/// ```
/// use monolayer::mount::Mount;
///
/// let mount: Mount = serde_json::from_str(
///     r#"{"type":"bind","source":"/var/lib/snapshots/1/fs","options":["rbind","ro"]}"#,
/// )?;
/// assert_eq!(mount.get_mount_type(), "bind");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Mount {
    /// The filesystem type, e.g. `overlay` or `bind`.
    #[serde(rename = "type")]
    mount_type: String,

    /// The mount source.
    source: String,

    /// The mount options, e.g. `ro` or `lowerdir=/a:/b`.
    #[serde(default)]
    options: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Mount {
    /// Creates a new mount specification.
    pub fn new(
        mount_type: impl Into<String>,
        source: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            mount_type: mount_type.into(),
            source: source.into(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a recursive read-only bind mount of `source`.
    pub fn bind(source: impl Into<String>) -> Self {
        Self::new(MOUNT_TYPE_BIND, source, ["rbind", "ro"])
    }

    /// Returns a copy of this mount with its options replaced.
    pub fn with_options(&self, options: Vec<String>) -> Self {
        Self {
            mount_type: self.mount_type.clone(),
            source: self.source.clone(),
            options,
        }
    }

    /// Checks if this mount is an overlay mount.
    pub fn is_overlay(&self) -> bool {
        self.mount_type == MOUNT_TYPE_OVERLAY
    }

    /// Checks if this mount is a bind mount, either by type or by a `bind`/`rbind` option.
    pub fn is_bind(&self) -> bool {
        self.mount_type == MOUNT_TYPE_BIND
            || self
                .options
                .iter()
                .any(|option| option == "bind" || option == "rbind")
    }
}
