//! CDI spec generation and cleanup
//!
//! Every file this crate writes is named
//! `rdma-cdi_<prefix>_<name>.<ext>` (see [`spec_file_name`]). Cleanup relies
//! on that name alone, so it never deletes a file without the `rdma-cdi_`
//! prefix or with an extension other than a supported [`SpecFormat`].

mod spec;

pub use spec::{ContainerEdits, Device, Spec, SpecDeviceNode, SpecFormat, CDI_VERSION};

use std::collections::BTreeMap;
use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::device::RdmaDevice;
use crate::error::{RdmaCdiError, Result};
use crate::utils::derive_default_name;

/// Prepended to every spec file written by this tool
pub const FILE_PREFIX: &str = "rdma-cdi";

/// Standard CDI spec directory
pub const DEFAULT_OUTPUT_DIR: &str = "/etc/cdi";

/// Resource prefix used when none is given
pub const DEFAULT_PREFIX: &str = "rdma";

/// Prefix with every `/` replaced so it fits in one file name component
fn safe_prefix(prefix: &str) -> String {
    prefix.replace('/', "_")
}

/// Deterministic spec file name: `rdma-cdi_<prefix>_<name>.<format>`.
///
/// Slashes in `prefix` become `_`, so `example.io/rdma` yields
/// `rdma-cdi_example.io_rdma_<name>.<format>`.
pub fn spec_file_name(prefix: &str, name: &str, format: &str) -> String {
    format!("{FILE_PREFIX}_{}_{name}.{format}", safe_prefix(prefix))
}

/// Path of a spec file inside `dir`.
///
/// Rejects names that would leave `dir` or escape the
/// `rdma-cdi_<prefix>_` namespace, so neither writes nor removals can touch
/// a file this tool did not name.
fn spec_path(dir: &Path, prefix: &str, name: &str, format: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains('/') || name.contains("..") || name.contains('\0') {
        return Err(RdmaCdiError::Validation(format!(
            "invalid resource name {name:?}: must be a single path component"
        )));
    }

    let path = dir.join(spec_file_name(prefix, name, format));
    let stem = format!("{FILE_PREFIX}_{}_", safe_prefix(prefix));
    let in_namespace = path.parent() == Some(dir)
        && path
            .file_name()
            .map(|file| file.to_string_lossy().starts_with(&stem))
            .unwrap_or(false);
    if !in_namespace {
        return Err(RdmaCdiError::Validation(format!(
            "spec path {} is outside {}",
            path.display(),
            dir.display()
        )));
    }
    Ok(path)
}

/// Write a CDI spec for `devices` into `output_dir`.
///
/// The spec kind is `resource_prefix/resource_name` and each device is
/// keyed by its PCI address. The file is written to a temporary name in
/// `output_dir` and renamed into place. Returns the final path.
pub fn create_cdi_spec(
    resource_prefix: &str,
    resource_name: &str,
    devices: &[RdmaDevice],
    output_dir: impl AsRef<Path>,
    format: &str,
) -> Result<PathBuf> {
    let output_dir = output_dir.as_ref();
    info!("creating CDI spec for resource {resource_name:?} (prefix={resource_prefix})");

    if devices.is_empty() {
        return Err(RdmaCdiError::Validation(
            "cannot create a CDI spec without devices".to_string(),
        ));
    }

    let spec = Spec::build(resource_prefix, resource_name, devices);
    spec.validate()?;

    let format: SpecFormat = format.parse()?;
    let data = spec.marshal(format)?;

    let path = spec_path(output_dir, resource_prefix, resource_name, format.extension())?;
    write_atomic(output_dir, &path, &data)?;

    info!("CDI spec written to {}", path.display());
    Ok(path)
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| RdmaCdiError::io(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".rdma-cdi-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| RdmaCdiError::io(dir, e))?;
    tmp.write_all(data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RdmaCdiError::io(tmp.path(), e))?;
    fs::set_permissions(tmp.path(), Permissions::from_mode(0o644))
        .map_err(|e| RdmaCdiError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| RdmaCdiError::io(path, e.error))?;
    Ok(())
}

/// Write one spec per device, each named after its PCI address.
///
/// Every device is attempted. Failures are logged and reported together as
/// [`RdmaCdiError::Batch`] once the whole list has been processed.
pub fn generate_per_device(
    resource_prefix: &str,
    devices: &[RdmaDevice],
    output_dir: impl AsRef<Path>,
    format: &str,
) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    let mut written = Vec::with_capacity(devices.len());
    let mut failed = 0;

    for dev in devices {
        let name = derive_default_name(&dev.pci_address, "");
        match create_cdi_spec(
            resource_prefix,
            &name,
            std::slice::from_ref(dev),
            output_dir,
            format,
        ) {
            Ok(path) => written.push(path),
            Err(e) => {
                error!("failed to generate spec for {}: {e}", dev.pci_address);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(RdmaCdiError::Batch {
            failed,
            total: devices.len(),
        });
    }
    Ok(written)
}

/// CDI qualified device name, `vendor/class=name`
pub fn qualified_name(vendor: &str, class: &str, name: &str) -> String {
    format!("{vendor}/{class}={name}")
}

/// Container annotations requesting `devices` through CDI.
///
/// Each key is the qualified device name and maps to itself.
pub fn create_container_annotations(
    devices: &[RdmaDevice],
    resource_prefix: &str,
    resource_kind: &str,
) -> Result<BTreeMap<String, String>> {
    if devices.is_empty() {
        return Err(RdmaCdiError::Validation("devices list is empty".to_string()));
    }

    let annotations: BTreeMap<String, String> = devices
        .iter()
        .map(|dev| {
            let qn = qualified_name(resource_prefix, resource_kind, &dev.pci_address);
            (qn.clone(), qn)
        })
        .collect();

    debug!("created CDI annotations: {annotations:?}");
    Ok(annotations)
}

/// Remove spec files written by this tool from `dir`.
///
/// With a `name`, only the `.json`/`.yaml` files for exactly that
/// prefix and name are candidates. Without one, every
/// `rdma-cdi_<prefix>_*.<ext>` file for a supported extension is. Missing
/// files are skipped. With `dry_run` nothing is deleted but the same list
/// is returned. A `name` that is not a single path component is rejected
/// with [`RdmaCdiError::Validation`].
pub fn cleanup_specs(
    dir: impl AsRef<Path>,
    prefix: &str,
    name: &str,
    dry_run: bool,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let dir = if dir.as_os_str().is_empty() {
        Path::new(DEFAULT_OUTPUT_DIR)
    } else {
        dir
    };

    let candidates = if name.is_empty() {
        matching_specs(dir, prefix)?
    } else {
        SpecFormat::ALL
            .iter()
            .map(|format| spec_path(dir, prefix, name, format.extension()))
            .collect::<Result<Vec<_>>>()?
    };

    cleanup_files(candidates, dry_run)
}

/// Files in `dir` named `rdma-cdi_<prefix>_*.<ext>`, grouped by extension
fn matching_specs(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let stem = format!("{FILE_PREFIX}_{}_", safe_prefix(prefix));

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RdmaCdiError::io(dir, e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RdmaCdiError::io(dir, e))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut matches = Vec::new();
    for format in SpecFormat::ALL {
        let suffix = format!(".{}", format.extension());
        matches.extend(
            names
                .iter()
                .filter(|name| {
                    name.len() >= stem.len() + suffix.len()
                        && name.starts_with(&stem)
                        && name.ends_with(&suffix)
                })
                .map(|name| dir.join(name)),
        );
    }
    Ok(matches)
}

fn cleanup_files(paths: Vec<PathBuf>, dry_run: bool) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in paths {
        if fs::symlink_metadata(&path).is_err() {
            continue;
        }
        if dry_run {
            info!("[dry-run] would remove: {}", path.display());
            removed.push(path);
            continue;
        }
        info!("removing CDI spec file: {}", path.display());
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(RdmaCdiError::io(&path, e)),
        }
    }
    Ok(removed)
}
