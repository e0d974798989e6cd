//! Command dispatch
//!
//! Every command that touches the preferences file goes through the
//! lifecycle: read on start, write back on shutdown for mutating commands.

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands, ValueKind};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::application::services::export;
use crate::config::{global_config_path, Settings};
use crate::domain::{parse_dotted, PrefValue};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::{Format, InfraError};

pub fn execute(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see `preftree --help`".to_string(),
        ));
    };
    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => cmd_config(cli, command),
        Commands::Get { path } => cmd_get(&open(cli)?, path),
        Commands::Set { path, value, kind } => {
            let container = open(cli)?;
            cmd_set(&container, path, value, *kind)?;
            commit(&container)
        }
        Commands::Unset { path } => {
            let container = open(cli)?;
            cmd_unset(&container, path)?;
            commit(&container)
        }
        Commands::Tree { path } => cmd_tree(&open(cli)?, path.as_deref()),
        Commands::Dump { to } => cmd_dump(&open(cli)?, *to),
        Commands::Import { file, from } => {
            let container = open(cli)?;
            cmd_import(&container, file, *from)?;
            commit(&container)
        }
    }
}

/// Effective settings: config layers, then `--file` and `--format`.
pub fn settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load()?;
    if let Some(file) = &cli.file {
        let file = absolute(file)?;
        if cli.format.is_none() {
            if let Some(format) = Format::from_extension(&file) {
                settings.persistence.format = format;
            }
        }
        settings.persistence.location = Some(file);
    }
    if let Some(format) = cli.format {
        settings.persistence.format = format;
    }
    Ok(settings)
}

fn absolute(path: &Path) -> CliResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| InfraError::io("resolve working directory", e))?;
    Ok(cwd.join(path))
}

/// Builds the container and reads the preferences file.
fn open(cli: &Cli) -> CliResult<ServiceContainer> {
    let container = ServiceContainer::new(settings(cli)?);
    let outcome = container.lifecycle.init()?;
    debug!(
        "opened {} ({:?})",
        container.persistence.location().display(),
        outcome
    );
    Ok(container)
}

fn commit(container: &ServiceContainer) -> CliResult<()> {
    if !container.lifecycle.shutdown()? {
        output::warning("preferences were not written");
    }
    Ok(())
}

/// Splits a dotted reference; a reference without a dot names a root key.
fn split_reference(reference: &str) -> CliResult<(String, String)> {
    if reference.trim().is_empty() {
        return Err(CliError::InvalidArgs("empty preference path".to_string()));
    }
    let parsed = parse_dotted(reference);
    match parsed.key {
        Some(key) if !key.trim().is_empty() => Ok((parsed.node_path, key)),
        Some(_) => Err(CliError::InvalidArgs(format!(
            "'{reference}' has no key after the last '.'"
        ))),
        None => Ok((String::new(), parsed.node_path)),
    }
}

#[instrument(level = "debug", skip(container))]
fn cmd_get(container: &ServiceContainer, reference: &str) -> CliResult<()> {
    let (node_path, key) = split_reference(reference)?;
    let value = container
        .preferences
        .find_node(&node_path)
        .and_then(|node| node.get(&key))
        .ok_or_else(|| CliError::NotFound(reference.to_string()))?;
    output::info(&value.to_plain_string());
    Ok(())
}

fn parse_value(container: &ServiceContainer, raw: &str, kind: ValueKind) -> CliResult<PrefValue> {
    let text = PrefValue::text(raw);
    let converters = &container.converters;
    let value = match kind {
        ValueKind::Text => text,
        ValueKind::Int => PrefValue::Int(converters.convert::<i64>(&text, None)?),
        ValueKind::Float => PrefValue::Float(converters.convert::<f64>(&text, None)?),
        ValueKind::Bool => PrefValue::Bool(converters.convert::<bool>(&text, None)?),
    };
    Ok(value)
}

#[instrument(level = "debug", skip(container))]
fn cmd_set(container: &ServiceContainer, reference: &str, raw: &str, kind: ValueKind) -> CliResult<()> {
    let (node_path, key) = split_reference(reference)?;
    let value = parse_value(container, raw, kind)?;
    container.preferences.node(&node_path)?.put(&key, value.clone())?;
    output::action("Set", &format!("{reference} = {value}"));
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_unset(container: &ServiceContainer, reference: &str) -> CliResult<()> {
    let (node_path, key) = split_reference(reference)?;
    let node = container
        .preferences
        .find_node(&node_path)
        .ok_or_else(|| CliError::NotFound(reference.to_string()))?;
    match node.remove(&key)? {
        Some(old) => {
            output::action("Removed", &format!("{reference} (was {old})"));
            Ok(())
        }
        None => Err(CliError::NotFound(reference.to_string())),
    }
}

fn cmd_tree(container: &ServiceContainer, path: Option<&str>) -> CliResult<()> {
    let path = path.unwrap_or_default();
    let node = container
        .preferences
        .find_node(path)
        .ok_or_else(|| CliError::NotFound(path.to_string()))?;
    output::info(&output::node_tree(&node));
    Ok(())
}

fn cmd_dump(container: &ServiceContainer, to: Option<Format>) -> CliResult<()> {
    let codec = to.map(Format::codec).unwrap_or_else(|| container.codec.clone());
    let bytes = export(&container.preferences, codec.as_ref())
        .map_err(|e| InfraError::io(format!("encode {}", codec.name()), e))?;
    output::info(String::from_utf8_lossy(&bytes).trim_end());
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_import(container: &ServiceContainer, file: &Path, from: Option<Format>) -> CliResult<()> {
    let format = from.or_else(|| Format::from_extension(file)).ok_or_else(|| {
        CliError::InvalidArgs(format!(
            "cannot tell the format of {}, use --from",
            file.display()
        ))
    })?;
    let source = absolute(file)?;
    container
        .persistence
        .import(&container.preferences, &source, format.codec().as_ref())?;
    output::action("Imported", &source.display());
    Ok(())
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = settings(cli)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => {
            let settings = settings(cli)?;
            output::header("Configuration:");
            match global_config_path() {
                Some(path) => {
                    let state = if path.exists() { "" } else { " (not found)" };
                    output::detail(&format!("global: {}{}", path.display(), state));
                }
                None => output::detail("global: (no config directory)"),
            }
            output::header("Preferences:");
            output::detail(&settings.preferences_file().display());
        }
    }
    Ok(())
}
