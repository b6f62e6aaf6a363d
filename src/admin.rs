//! Offline maintenance of the server's journals.
//!
//! These commands open the data directory directly. The server must be
//! stopped while they run: it caches journals in memory and its next write
//! would replace whatever `compact` or `reset` wrote to disk.

use clap::{Args, Subcommand};

use crate::server::JournalStore;

/// Offline journal maintenance. Stop the server before running these.
#[derive(Args)]
pub struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand)]
enum AdminSubcommand {
    /// List groups with a journal
    Groups,
    /// List a group's zones and record counts
    Zones {
        /// Group ID
        group: String,
    },
    /// Drop tombstones; clients holding older tokens resync from scratch (server must be stopped)
    Compact {
        /// Group ID
        group: String,
    },
    /// Invalidate every change token issued for a group (server must be stopped)
    Reset {
        /// Group ID
        group: String,
    },
}

impl AdminCommand {
    pub fn run(&self, store: &JournalStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            AdminSubcommand::Groups => list_groups(store),
            AdminSubcommand::Zones { group } => list_zones(store, group),
            AdminSubcommand::Compact { group } => {
                compact(store, group)?;
                println!("Compacted journal for group: {}", group);
                Ok(())
            }
            AdminSubcommand::Reset { group } => {
                reset(store, group)?;
                println!("Reset change tokens for group: {}", group);
                Ok(())
            }
        }
    }
}

fn list_groups(store: &JournalStore) -> Result<(), Box<dyn std::error::Error>> {
    let groups = store.groups()?;

    if groups.is_empty() {
        println!("No groups found.");
        return Ok(());
    }

    println!("{:<30} {:<10}", "GROUP", "ZONES");
    println!("{}", "-".repeat(40));
    for group in &groups {
        let zones = store.read(group, |j| j.zones().len())?;
        println!("{:<30} {:<10}", group, zones);
    }

    println!();
    println!("Total: {} group(s)", groups.len());
    Ok(())
}

fn list_zones(store: &JournalStore, group: &str) -> Result<(), Box<dyn std::error::Error>> {
    let zones = store.read(group, |j| {
        j.zones()
            .into_iter()
            .map(|zone| {
                let count = j.record_count(&zone).unwrap_or(0);
                (zone, count)
            })
            .collect::<Vec<_>>()
    })?;

    if zones.is_empty() {
        println!("No zones in group '{}'.", group);
        return Ok(());
    }

    println!("{:<30} {:<10}", "ZONE", "RECORDS");
    println!("{}", "-".repeat(40));
    for (zone, count) in zones {
        println!("{:<30} {:<10}", zone, count);
    }
    Ok(())
}

fn compact(store: &JournalStore, group: &str) -> Result<(), Box<dyn std::error::Error>> {
    store.write(group, |j| j.compact())?;
    Ok(())
}

fn reset(store: &JournalStore, group: &str) -> Result<(), Box<dyn std::error::Error>> {
    store.write(group, |j| j.reset())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesync_core::{RemoteError, ZoneId};
    use tempfile::TempDir;

    fn store_with_token() -> (JournalStore, TempDir, tablesync_core::ChangeToken) {
        let temp = TempDir::new().unwrap();
        let store = JournalStore::new(temp.path());
        store
            .write("family", |j| j.create_zone(&ZoneId::new("notes")))
            .unwrap();
        let token = store
            .read("family", |j| j.database_changes(None))
            .unwrap()
            .unwrap()
            .token;
        (store, temp, token)
    }

    #[test]
    fn test_reset_expires_tokens() {
        let (store, temp, token) = store_with_token();

        reset(&store, "family").unwrap();

        // A fresh store sees the persisted epoch.
        let reopened = JournalStore::new(temp.path());
        let result = reopened
            .read("family", |j| j.database_changes(Some(&token)))
            .unwrap();
        assert_eq!(result.unwrap_err(), RemoteError::ChangeTokenExpired);
    }

    #[test]
    fn test_compact_keeps_zones() {
        let (store, _temp, _token) = store_with_token();

        compact(&store, "family").unwrap();

        assert!(store
            .read("family", |j| j.has_zone(&ZoneId::new("notes")))
            .unwrap());
    }

    #[test]
    fn test_invalid_group_is_error() {
        let temp = TempDir::new().unwrap();
        let store = JournalStore::new(temp.path());
        assert!(reset(&store, "../escape").is_err());
    }

    #[derive(clap::Parser)]
    struct AdminCli {
        #[command(flatten)]
        admin: AdminCommand,
    }

    #[test]
    fn test_writing_commands_warn_about_running_server() {
        use clap::CommandFactory;

        let mut cmd = AdminCli::command();
        for name in ["compact", "reset"] {
            let help = cmd
                .find_subcommand_mut(name)
                .unwrap()
                .render_help()
                .to_string();
            assert!(help.contains("server must be stopped"), "{name}: {help}");
        }
    }
}
