// Restore a dynamic config snapshot from one of its backups.
//
// Usage:
//   cargo run --bin restore_from_backup -- --db dynamic_config.db --providers providers.json --list-types
//   cargo run --bin restore_from_backup -- --providers providers.json --config skin --list-backups
//   cargo run --bin restore_from_backup -- --providers providers.json --config skin --backup-timestamp 20240101120000
//
// The providers file holds the same key -> spec object the host registers at startup.

use anyhow::{bail, Context};
use clap::Parser;
use dynamic_config::domain::{parse_timestamp, DISPLAY_FORMAT, TIMESTAMP_FORMAT};
use dynamic_config::{
    bootstrap, get_default_db_path, logging, BootstrapOptions, ConfigProvider, DynamicConfigManager,
    GlobalState, ManagerSettings, ProviderFactoryRegistry, ProviderSpecs,
};
use std::io::Write;

#[derive(Parser, Debug)]
#[command(name = "restore_from_backup")]
#[command(about = "Restore dynamic config from backup", long_about = None)]
struct Cli {
    /// Database path (defaults to DYNAMIC_CONFIG_DB_PATH or the user data dir)
    #[arg(long)]
    db: Option<String>,

    /// JSON file with provider specs
    #[arg(long)]
    providers: Option<String>,

    /// List types of dynamic configs
    #[arg(long)]
    list_types: bool,

    /// List backups for config specified
    #[arg(long)]
    list_backups: bool,

    /// Config name
    #[arg(long)]
    config: Option<String>,

    /// Timestamp of backup to restore from (YmdHis)
    #[arg(long)]
    backup_timestamp: Option<String>,
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let specs = match &cli.providers {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read providers file {}", path))?;
            ProviderSpecs::from_json_str(&raw)?
        }
        None => ProviderSpecs::new(),
    };

    let factories = ProviderFactoryRegistry::new(GlobalState::new());
    let manager = bootstrap(BootstrapOptions {
        db_path: cli.db.clone().unwrap_or_else(get_default_db_path),
        specs,
        factories: &factories,
        hooks: Vec::new(),
        settings: ManagerSettings::from_env(),
    })?;

    let stdout = std::io::stdout();
    run(&cli, &manager, &mut stdout.lock())
}

fn run(cli: &Cli, manager: &DynamicConfigManager, out: &mut impl Write) -> anyhow::Result<()> {
    if cli.list_types {
        writeln!(out, "Available config types:")?;
        for key in manager.list_types() {
            writeln!(out, "- {}", key)?;
        }
        return Ok(());
    }

    let Some(name) = cli.config.as_deref() else {
        bail!("Config name not specified");
    };
    let Some(config) = manager.get_config_object(name) else {
        bail!("Config not found");
    };

    if cli.list_backups {
        let backups = manager.list_backups(config.as_ref())?;
        if backups.is_empty() {
            writeln!(out, "No backups found for '{}'", config.key())?;
            return Ok(());
        }
        writeln!(out, "Available backups for '{}':", config.key())?;
        for ts in backups {
            writeln!(
                out,
                "- {} (specify: {})",
                ts.format(DISPLAY_FORMAT),
                ts.format(TIMESTAMP_FORMAT)
            )?;
        }
        return Ok(());
    }

    let Some(raw) = cli.backup_timestamp.as_deref() else {
        bail!("Backup timestamp not specified");
    };
    let Some(timestamp) = parse_timestamp(raw) else {
        bail!("Invalid backup timestamp");
    };

    manager.restore_from_backup(config.as_ref(), timestamp)?;
    writeln!(out, "Backup restored")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dynamic_config::Clock;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct MinuteClock(AtomicU32);

    impl Clock for MinuteClock {
        fn now(&self) -> chrono::NaiveDateTime {
            let minute = self.0.fetch_add(1, Ordering::SeqCst);
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, minute, 0)
                .unwrap()
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["restore_from_backup"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn manager() -> Arc<DynamicConfigManager> {
        let factories = ProviderFactoryRegistry::new(GlobalState::new());
        let specs = ProviderSpecs::from_value(json!({
            "skin": {"factory": "globals", "globals": ["wgDefaultSkin"]}
        }))
        .unwrap();
        bootstrap(BootstrapOptions {
            db_path: ":memory:".to_string(),
            specs,
            factories: &factories,
            hooks: Vec::new(),
            settings: ManagerSettings::default(),
        })
        .unwrap()
    }

    fn output(cli: &Cli, manager: &DynamicConfigManager) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        run(cli, manager, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_list_types() {
        let manager = manager();
        let out = output(&cli(&["--list-types"]), &manager).unwrap();
        assert_eq!(out, "Available config types:\n- skin\n");
    }

    #[test]
    fn test_missing_config_name() {
        let manager = manager();
        let err = output(&cli(&["--list-backups"]), &manager).unwrap_err();
        assert_eq!(err.to_string(), "Config name not specified");
    }

    #[test]
    fn test_unknown_config() {
        let manager = manager();
        let err = output(&cli(&["--config", "nope", "--list-backups"]), &manager).unwrap_err();
        assert_eq!(err.to_string(), "Config not found");
    }

    #[test]
    fn test_list_backups_empty() {
        let manager = manager();
        let out = output(&cli(&["--config", "skin", "--list-backups"]), &manager).unwrap();
        assert_eq!(out, "No backups found for 'skin'\n");
    }

    #[test]
    fn test_list_and_restore_backup() {
        let factories = ProviderFactoryRegistry::new(GlobalState::new());
        let specs = ProviderSpecs::from_value(json!({
            "skin": {"factory": "globals", "globals": ["wgDefaultSkin"]}
        }))
        .unwrap();
        let manager = bootstrap(BootstrapOptions {
            db_path: ":memory:".to_string(),
            specs,
            factories: &factories,
            hooks: Vec::new(),
            settings: ManagerSettings::default(),
        })
        .unwrap();
        let manager = Arc::try_unwrap(manager)
            .ok()
            .unwrap()
            .with_clock(Arc::new(MinuteClock(AtomicU32::new(0))));

        let skin = manager.get_config_object("skin").unwrap();
        assert!(manager.store_config(skin.as_ref(), None, Some(r#"{"wgDefaultSkin":"vector"}"#)));
        assert!(manager.store_config(skin.as_ref(), None, Some(r#"{"wgDefaultSkin":"timeless"}"#)));

        let out = output(&cli(&["--config", "skin", "--list-backups"]), &manager).unwrap();
        assert_eq!(
            out,
            "Available backups for 'skin':\n- 2024-01.01 12:00:00 (specify: 20240101120000)\n"
        );

        let err = output(&cli(&["--config", "skin"]), &manager).unwrap_err();
        assert_eq!(err.to_string(), "Backup timestamp not specified");

        let err = output(&cli(&["--config", "skin", "--backup-timestamp", "2024-01-01"]), &manager)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid backup timestamp");

        let out = output(
            &cli(&["--config", "skin", "--backup-timestamp", "20240101120000"]),
            &manager,
        )
        .unwrap();
        assert_eq!(out, "Backup restored\n");

        manager.force_reload();
        assert_eq!(
            manager.retrieve_raw(skin.as_ref()).as_deref(),
            Some(r#"{"wgDefaultSkin":"vector"}"#)
        );
    }

    #[test]
    fn test_restore_unknown_backup_reports_error() {
        let manager = manager();
        let err = output(
            &cli(&["--config", "skin", "--backup-timestamp", "20240101120000"]),
            &manager,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid backup timestamp: 20240101120000");
    }
}
