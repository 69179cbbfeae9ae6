use std::collections::HashMap;

use crate::aliases::ArtistAliases;
use crate::db::{Database, Result};
use crate::pattern::PathPattern;

/// Materialize a virtual path for every (track, file) pair the groveler
/// emitted, interning interior directories through an in-memory map so
/// each one hits the store once. Runs in its own transaction and ends
/// with a childless-directory sweep.
pub fn build_paths(
    db: &Database,
    pattern: &PathPattern,
    aliases: Option<&ArtistAliases>,
    pairs: &[(i64, i64)],
) -> Result<u64> {
    let tx = db.transaction()?;
    let mut known: HashMap<String, i64> = HashMap::new();
    let mut created: u64 = 0;
    let levels = pattern.level_count();

    for &(track_id, file_id) in pairs {
        let mut attrs = db.get_attributes(file_id)?;
        if let Some(aliases) = aliases {
            if let Some(canonical) = aliases.lookup(&attrs.artist) {
                attrs.artist = canonical.to_string();
            }
            if let Some(canonical) = aliases.lookup(&attrs.albumartist) {
                attrs.albumartist = canonical.to_string();
            }
        }

        let mut vpath = String::new();
        let mut parent: Option<i64> = None;
        for level in 0..levels {
            pattern.append_level(&mut vpath, &attrs, level);
            if let Some(&id) = known.get(&vpath) {
                parent = Some(id);
                continue;
            }
            let leaf = (level == levels - 1).then_some((track_id, file_id));
            let id = db.add_path(&vpath, parent, leaf)?;
            known.insert(vpath.clone(), id);
            parent = Some(id);
            created += 1;
        }
    }

    let pruned = db.clean_paths()?;
    if pruned > 0 {
        log::debug!("pruned {pruned} childless directories");
    }
    tx.commit()?;
    log::info!("built {created} virtual paths");
    Ok(created)
}
