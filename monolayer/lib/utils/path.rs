use std::path::PathBuf;

use crate::config::monolayer_home;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory name under the user's home directory that holds monolayer data.
pub const MONOLAYER_HOME_DIR: &str = ".monolayer";

/// The environment variable that overrides the monolayer home directory.
pub const MONOLAYER_HOME_ENV_VAR: &str = "MONOLAYER_HOME";

/// The sub directory of the monolayer home that holds the default content store.
pub const STORE_SUBDIR: &str = "store";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path of the default local content store.
pub fn default_store_path() -> PathBuf {
    monolayer_home().join(STORE_SUBDIR)
}
