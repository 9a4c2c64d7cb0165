pub mod analyze;
pub mod check;
pub mod estimate;
pub mod export;
pub mod info;

use std::path::Path;

use scenestitch_timeline_model::TimelineDocument;

pub(crate) fn load_document(path: &Path) -> anyhow::Result<TimelineDocument> {
    TimelineDocument::load(path)
        .map_err(|e| anyhow::anyhow!("Failed to load timeline {}: {e}", path.display()))
}
