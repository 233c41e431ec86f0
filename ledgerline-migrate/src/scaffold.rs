//! `generate`: scaffold a new step file linked to the current chain tail

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static NAME_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").ok());

const MOD_FILE: &str = "mod.rs";

#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    #[error("step name '{0}' must be snake_case (lowercase letters, digits, underscores)")]
    InvalidName(String),
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not find the module list in {}", .0.display())]
    UnrecognizedModFile(PathBuf),
}

/// A scaffolded step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaffold {
    pub id: String,
    pub path: PathBuf,
    /// Whether `mod.rs` was updated to declare and register the step
    pub registered: bool,
}

/// # Errors
///
/// Returns `ScaffoldError::InvalidName` for anything but snake_case.
pub fn validate_name(name: &str) -> Result<(), ScaffoldError> {
    if NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
    {
        Ok(())
    } else {
        Err(ScaffoldError::InvalidName(name.to_string()))
    }
}

#[must_use]
pub fn step_id(now: DateTime<Utc>, name: &str) -> String {
    format!("m{}_{name}", now.format("%Y%m%d%H%M%S"))
}

/// Source of a new step file
///
/// Step modules are named after their ids, so the predecessor's `ID` is
/// reachable as `super::{predecessor}::ID`.
#[must_use]
pub fn render(id: &str, name: &str, predecessor: Option<&str>, now: DateTime<Utc>) -> String {
    let predecessor = predecessor.map_or_else(|| "None".to_string(), |p| format!("Some(super::{p}::ID)"));
    format!(
        r#"//! {description}
//!
//! Generated: {generated}

use crate::migration::SqlMigration;

pub const ID: &str = "{id}";

pub fn migration() -> SqlMigration {{
    SqlMigration::new(ID, {predecessor})
        .describe("{description}")
        // .forward("ALTER TABLE ... ADD COLUMN ...")
        // .backward("ALTER TABLE ... DROP COLUMN ...")
}}
"#,
        description = name.replace('_', " "),
        generated = now.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Declare and register `module` in the contents of a migrations `mod.rs`
///
/// The declaration goes after the last `pub mod m...;` line and the
/// registration after the last `Box::new(m...)` line. Returns `None` when
/// either anchor is missing.
#[must_use]
pub fn register_module(mod_rs: &str, module: &str) -> Option<String> {
    let lines: Vec<&str> = mod_rs.lines().collect();
    let last_decl = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with("pub mod m") && l.trim_end().ends_with(';'))?;
    let last_entry = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with("Box::new(m"))?;
    let indent: String = lines[last_entry]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 2);
    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        if i == last_decl {
            out.push(format!("pub mod {module};"));
        }
        if i == last_entry {
            out.push(format!("{indent}Box::new({module}::migration()),"));
        }
    }
    let mut joined = out.join("\n");
    if mod_rs.ends_with('\n') {
        joined.push('\n');
    }
    Some(joined)
}

/// Write the step file into `dir` and register it in `dir/mod.rs` when present
///
/// # Errors
///
/// Returns an error for an invalid name, an existing file, a `mod.rs` in an
/// unexpected shape, or any filesystem failure.
pub fn generate(
    dir: &Path,
    name: &str,
    predecessor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Scaffold, ScaffoldError> {
    validate_name(name)?;
    let id = step_id(now, name);
    let path = dir.join(format!("{id}.rs"));
    if path.exists() {
        return Err(ScaffoldError::AlreadyExists(path));
    }

    fs::create_dir_all(dir).map_err(|source| ScaffoldError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, render(&id, name, predecessor, now)).map_err(|source| ScaffoldError::Io {
        path: path.clone(),
        source,
    })?;
    log::debug!("wrote {}", path.display());

    let mod_path = dir.join(MOD_FILE);
    let registered = if mod_path.exists() {
        let current = fs::read_to_string(&mod_path).map_err(|source| ScaffoldError::Io {
            path: mod_path.clone(),
            source,
        })?;
        let updated = register_module(&current, &id)
            .ok_or_else(|| ScaffoldError::UnrecognizedModFile(mod_path.clone()))?;
        fs::write(&mod_path, updated).map_err(|source| ScaffoldError::Io {
            path: mod_path.clone(),
            source,
        })?;
        true
    } else {
        false
    };

    Ok(Scaffold {
        id,
        path,
        registered,
    })
}
