mod logging;
mod report;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libris_config::{AppConfig, ConfigLoader};
use libris_db::{Database, schema};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "libris", version, about = "Schema migrations for the Libris backend")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to ~/.config/libris/config.yml if present.
    #[arg(long, global = true, env = "LIBRIS_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file; overrides the config and LIBRIS_DATABASE_PATH.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `libris_db=trace`; overrides the config.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Apply all pending migrations
    Migrate,
    /// Show applied and pending migrations
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Revert one migration (the latest applied one by default)
    Rollback {
        /// Migration identifier, e.g. 002_books
        id: Option<String>,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    logging::init(&config.log);
    info!("using database {}", config.database.path.display());

    let db = Database::open(
        &config.database.path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )
    .with_context(|| format!("failed to open {}", config.database.path.display()))?;
    let migrator = schema::migrator().context("invalid migration registry")?;

    match cli.command {
        Command::Migrate => {
            let report = db.migrate(&migrator).context("migration failed")?;
            report::print_run_report(&report);
        }
        Command::Status { json } => {
            let status = db
                .migration_status(&migrator)
                .context("failed to read migration status")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                report::print_status(&status);
            }
        }
        Command::Rollback { id } => {
            match db
                .rollback(&migrator, id.as_deref())
                .context("rollback failed")?
            {
                Some(reverted) => println!("Reverted {reverted}."),
                None => println!("Nothing to roll back."),
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ConfigLoader::discover().context("failed to load config")?,
    };
    apply_cli_overrides(&mut config, cli);
    Ok(config)
}

/// Flags win over the config file and the environment.
fn apply_cli_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "libris",
            "status",
            "--json",
            "--database",
            "/tmp/books.db",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Status { json: true });
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/books.db")));
    }

    #[test]
    fn rollback_id_is_optional() {
        let cli = Cli::try_parse_from(["libris", "rollback"]).unwrap();
        assert_eq!(cli.command, Command::Rollback { id: None });

        let cli = Cli::try_parse_from(["libris", "rollback", "002_books"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Rollback {
                id: Some("002_books".into())
            }
        );
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["libris"]).is_err());
    }

    #[test]
    fn cli_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[database]\npath = \"from-file.db\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "libris",
            "--config",
            config_path.to_str().unwrap(),
            "--log-level",
            "debug",
            "migrate",
        ])
        .unwrap();
        let mut config = ConfigLoader::from_file(cli.config.as_deref().unwrap()).unwrap();
        apply_cli_overrides(&mut config, &cli);
        assert_eq!(config.database.path, PathBuf::from("from-file.db"));
        assert_eq!(config.log.level, "debug");

        let cli = Cli::try_parse_from(["libris", "migrate", "--database", "flag.db"]).unwrap();
        apply_cli_overrides(&mut config, &cli);
        assert_eq!(config.database.path, PathBuf::from("flag.db"));
        assert_eq!(config.log.level, "debug");
    }
}
