use super::Mount;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const UPPERDIR_OPTION: &str = "upperdir=";
const WORKDIR_OPTION: &str = "workdir=";
const LOWERDIR_OPTION: &str = "lowerdir=";

/// The separator between directories in an overlay `lowerdir=` option.
pub const OVERLAY_LAYER_SEPARATOR: char = ':';

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Rewrites overlay options so the overlay can be mounted a second time, read-only.
///
/// `workdir=` is dropped and `upperdir=` is removed. When an upper directory was present it is
/// prepended to every `lowerdir=` value, so it becomes the topmost read-only layer. Options
/// without `upperdir=` come back unchanged apart from `workdir=`.
///
/// When there is no `lowerdir=` option the upper directory is dropped with nothing to fold into.
///
/// ## Example
///
/// ```
/// use monolayer::mount::readonly_overlay;
///
/// let options = ["upperdir=/a", "lowerdir=/b:/c", "workdir=/d"].map(String::from);
/// assert_eq!(readonly_overlay(&options), vec!["lowerdir=/a:/b:/c".to_string()]);
/// ```
pub fn readonly_overlay(options: &[String]) -> Vec<String> {
    let mut upper = None;
    let mut out = Vec::with_capacity(options.len());

    for option in options {
        if let Some(dir) = option.strip_prefix(UPPERDIR_OPTION) {
            upper = Some(dir);
        } else if !option.starts_with(WORKDIR_OPTION) {
            out.push(option.clone());
        }
    }

    if let Some(upper) = upper {
        for option in out.iter_mut() {
            if let Some(lowers) = option.strip_prefix(LOWERDIR_OPTION) {
                *option = format!("{LOWERDIR_OPTION}{upper}{OVERLAY_LAYER_SEPARATOR}{lowers}");
            }
        }
    }

    out
}

/// Applies [`readonly_overlay`] to every overlay mount in `mounts`. Other mount types are copied
/// as they are.
pub fn rewrite_overlay_mounts(mounts: &[Mount]) -> Vec<Mount> {
    mounts
        .iter()
        .map(|mount| {
            if mount.is_overlay() {
                mount.with_options(readonly_overlay(mount.get_options()))
            } else {
                mount.clone()
            }
        })
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
