pub mod commit_graph;
pub mod multi_pack_index;

pub use commit_graph::{COMMIT_GRAPH_AREA, CommitGraphStep};
pub use multi_pack_index::{MULTI_PACK_INDEX_AREA, MultiPackIndexStep};

use std::path::Path;

fn object_dir_arg(object_dir: &Path) -> String {
    format!("--object-dir={}", object_dir.display())
}
