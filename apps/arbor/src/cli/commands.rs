//! # CLI Command Implementations

use crate::scenario::{Report, Scenario};
use arbor_core::{ArborError, import_canonical};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum scenario size (16 MB).
const MAX_SCENARIO_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum canonical export size (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), ArborError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ArborError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(ArborError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `path` to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, ArborError> {
    let canonical = path.canonicalize().map_err(|e| {
        ArborError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(ArborError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve the parent of `path`, which must be an existing directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, ArborError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        ArborError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(ArborError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| ArborError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Load a scenario after checking its path and size.
pub fn load_scenario(file: &Path) -> Result<Scenario, ArborError> {
    let validated = validate_file_path(file)?;
    validate_file_size(&validated, MAX_SCENARIO_FILE_SIZE)?;
    Scenario::load(&validated)
}

fn to_json(value: &serde_json::Value) -> Result<String, ArborError> {
    serde_json::to_string_pretty(value).map_err(|e| ArborError::SerializationError(e.to_string()))
}

// =============================================================================
// REPLAY COMMAND
// =============================================================================

pub fn cmd_replay(file: &Path, json_mode: bool) -> Result<(), ArborError> {
    let report = load_scenario(file)?.run()?;
    print_report(&report, json_mode)
}

fn print_report(report: &Report, json_mode: bool) -> Result<(), ArborError> {
    if json_mode {
        let finds: Vec<serde_json::Value> = report
            .finds
            .iter()
            .map(|f| {
                serde_json::json!({
                    "step": f.step,
                    "hit": f.hit.map(|id| id.to_string()),
                })
            })
            .collect();
        let output = serde_json::json!({
            "actions": report.actions,
            "errors": report.errors,
            "finds": finds,
            "checksum": report.checksum,
        });
        println!("{}", to_json(&output)?);
        return Ok(());
    }

    for label in report.labels() {
        println!("{}", label);
    }
    for error in &report.errors {
        println!("error: {}", error);
    }
    for find in &report.finds {
        match find.hit {
            Some(id) => println!("find (step {}): {}", find.step, id),
            None => println!("find (step {}): miss", find.step),
        }
    }
    println!("Checksum: {}", report.checksum);
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

pub fn cmd_validate(file: &Path, json_mode: bool) -> Result<(), ArborError> {
    let scenario = load_scenario(file)?;
    scenario.validate()?;

    if json_mode {
        let output = serde_json::json!({
            "valid": true,
            "tree": scenario.tree.name,
            "steps": scenario.steps.len(),
        });
        println!("{}", to_json(&output)?);
    } else {
        println!(
            "Scenario '{}' is valid: {} steps",
            scenario.tree.name,
            scenario.steps.len()
        );
    }
    Ok(())
}

// =============================================================================
// DUMP COMMAND
// =============================================================================

pub fn cmd_dump(file: &Path, output: &Path) -> Result<(), ArborError> {
    let validated_output = validate_output_path(output)?;
    let report = load_scenario(file)?.run()?;

    std::fs::write(&validated_output, &report.export)
        .map_err(|e| ArborError::IoError(format!("Write file: {}", e)))?;

    println!("Checksum: {}", report.checksum);
    println!(
        "Exported {} bytes to {}",
        report.export.len(),
        validated_output.display()
    );
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

pub fn cmd_inspect(input: &Path, json_mode: bool) -> Result<(), ArborError> {
    let validated = validate_file_path(input)?;
    validate_file_size(&validated, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated)
        .map_err(|e| ArborError::IoError(format!("Read file: {}", e)))?;
    let tree = import_canonical(&data)?;

    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    for entity in &tree.entities {
        *kinds.entry(entity.entity.kind.as_str()).or_default() += 1;
    }
    let instances: usize = tree.entities.iter().map(|e| e.instances.len()).sum();

    if json_mode {
        let output = serde_json::json!({
            "id": tree.id.to_string(),
            "name": tree.name,
            "entities": kinds,
            "check_instances": instances,
        });
        println!("{}", to_json(&output)?);
    } else {
        println!("Tree {} ({})", tree.name, tree.id);
        for (kind, count) in &kinds {
            println!("  {:<12} {}", kind, count);
        }
        println!("  {:<12} {}", "instances", instances);
    }
    Ok(())
}
