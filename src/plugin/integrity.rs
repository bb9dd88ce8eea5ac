/*
 * Patchbay - Audio Signal Routing Simulator
 * Copyright (c) 2025 MACHIKO LAB
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Directory digests for plugin integrity checks.
//!
//! The digest covers every regular file below the root in sorted path order.
//! For each file its `/`-separated relative path and then its bytes are fed
//! into a single SHA-256 state. Hidden entries, `__pycache__` and `target`
//! directories are skipped, as are symlinks.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use crate::plugin::{PluginError, PluginManifest, PluginResult};

/// Directory names never included in a digest.
pub const IGNORED_DIRS: &[&str] = &["__pycache__", "target"];

fn is_ignored(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && IGNORED_DIRS.contains(&name.as_ref())
}

/// Compute the lowercase hex SHA-256 digest of a plugin directory.
pub fn hash_directory<P: AsRef<Path>>(root: P) -> PluginResult<String> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(PluginError::PluginDirNotFound {
            path: root.to_path_buf(),
        });
    }

    let hashing_error = |reason: String| PluginError::Hashing {
        path: root.to_path_buf(),
        reason,
    };

    let mut hasher = Sha256::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored(entry));

    for entry in walker {
        let entry = entry.map_err(|e| hashing_error(e.to_string()))?;
        if entry.depth() > 0 && entry.path_is_symlink() {
            return Err(hashing_error(format!(
                "symbolic links are not allowed in a plugin directory: {}",
                entry.path().display()
            )));
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| hashing_error(e.to_string()))?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        hasher.update(relative.join("/").as_bytes());

        let mut file = File::open(entry.path()).map_err(|e| hashing_error(format!("{}: {}", entry.path().display(), e)))?;
        io::copy(&mut file, &mut hasher).map_err(|e| hashing_error(format!("{}: {}", entry.path().display(), e)))?;
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// プラグインディレクトリを検証
///
/// Recomputes the digest of `plugin_dir` and compares it with the manifest.
/// Returns the computed digest on success.
pub fn verify_plugin_dir<P: AsRef<Path>>(manifest: &PluginManifest, plugin_dir: P) -> PluginResult<String> {
    if manifest.hash.algorithm != "sha256" {
        return Err(PluginError::UnsupportedAlgorithm {
            algorithm: manifest.hash.algorithm.clone(),
        });
    }

    let actual = hash_directory(plugin_dir)?;
    if actual != manifest.hash.value {
        return Err(PluginError::HashMismatch {
            plugin: manifest.name.clone(),
            expected: manifest.hash.value.clone(),
            actual,
        });
    }
    Ok(actual)
}
