//! CLI command implementations

pub mod init;
pub mod path;
pub mod prune;
pub mod status;

pub use init::execute as init;
pub use path::execute as path;
pub use prune::execute as prune;
pub use status::execute as status;

use crate::cache::{build_id, BuildId};
use crate::config::CachePaths;
use crate::error::{SsgCacheError, SsgCacheResult};

/// The initialized build, or a user error pointing at `init`
async fn current_build(paths: &CachePaths) -> SsgCacheResult<BuildId> {
    build_id::current(paths)
        .await
        .ok_or_else(|| SsgCacheError::User("No build initialized. Run: ssg-cache init".to_string()))
}
