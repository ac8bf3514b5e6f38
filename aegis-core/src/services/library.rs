//! Playbook library loading.
//!
//! Playbooks can be maintained as YAML files in a directory and synced into
//! the store at startup. Files are matched to stored playbooks by name:
//! a known name updates the stored definition in place (keeping its id and
//! metrics), an unknown name creates a new playbook.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{AegisError, AegisResult};
use crate::models::Playbook;

use super::playbook_service::{NewPlaybook, PlaybookService};

/// Parse one YAML playbook definition.
pub fn load_playbook_file(path: &Path) -> AegisResult<NewPlaybook> {
    let raw = std::fs::read_to_string(path)?;
    let definition: NewPlaybook = serde_yaml::from_str(&raw).map_err(|e| {
        AegisError::Validation(format!("invalid playbook file {}: {e}", path.display()))
    })?;
    Ok(definition)
}

/// Load every `.yml`/`.yaml` file in a directory and upsert it by name.
/// Returns the playbooks as stored after the sync. A file that fails to
/// parse or validate is skipped with a warning; it never aborts the sync.
pub async fn sync_playbook_dir(
    service: &PlaybookService,
    dir: &Path,
) -> AegisResult<Vec<Playbook>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    entries.sort();

    let mut synced = Vec::new();
    for path in entries {
        let definition = match load_playbook_file(&path) {
            Ok(definition) => definition,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping playbook file");
                continue;
            }
        };

        let result = match service.find_by_name(&definition.name).await? {
            Some(existing) => service.update(existing.id, definition).await,
            None => service.create(definition).await,
        };
        match result {
            Ok(playbook) => {
                info!(name = %playbook.name, file = %path.display(), "Playbook synced");
                synced.push(playbook);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping invalid playbook");
            }
        }
    }
    Ok(synced)
}
