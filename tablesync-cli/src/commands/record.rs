use clap::{Args, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::RecordRepository;
use crate::models::{parse_field, LocalRecord};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct RecordCommand {
    #[command(subcommand)]
    pub command: RecordSubcommand,
}

#[derive(Subcommand)]
pub enum RecordSubcommand {
    /// Create or update a record
    Put {
        /// Record name (a new UUID when omitted)
        name: Option<String>,

        /// Record type (required for new records)
        #[arg(long = "type", short = 't')]
        record_type: Option<String>,

        /// Field as key=value (repeatable)
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,

        /// Replace all fields instead of merging into the existing ones
        #[arg(long)]
        replace: bool,
    },

    /// Show a record
    Show {
        /// Record name
        name: String,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List records
    List {
        /// Only records of this type
        #[arg(long = "type", short = 't')]
        record_type: Option<String>,

        /// Include records waiting for remote deletion
        #[arg(long)]
        all: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a record
    Delete {
        /// Record name
        name: String,
    },
}

impl RecordCommand {
    /// True for subcommands that change local rows.
    pub fn is_write(&self) -> bool {
        matches!(
            self.command,
            RecordSubcommand::Put { .. } | RecordSubcommand::Delete { .. }
        )
    }

    pub async fn run(&self, repo: &RecordRepository) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            RecordSubcommand::Put {
                name,
                record_type,
                fields,
                replace,
            } => {
                let name = name
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let record = put(repo, &name, record_type.as_deref(), fields, *replace).await?;
                println!("Saved record: {} ({})", record.name, record.dirty_state);
                Ok(())
            }
            RecordSubcommand::Show { name, format } => {
                let record = repo
                    .get(name)
                    .await?
                    .ok_or_else(|| format!("Record not found: {}", name))?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                    OutputFormat::Text => print_record(&record),
                }
                Ok(())
            }
            RecordSubcommand::List {
                record_type,
                all,
                format,
            } => {
                let records: Vec<LocalRecord> = repo
                    .list(*all)
                    .await?
                    .into_iter()
                    .filter(|r| record_type.as_ref().is_none_or(|t| &r.record_type == t))
                    .collect();
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                    OutputFormat::Text => print_table(&records),
                }
                Ok(())
            }
            RecordSubcommand::Delete { name } => {
                if repo.delete_local(name).await? {
                    println!("Deleted record: {}", name);
                    Ok(())
                } else {
                    Err(format!("Record not found: {}", name).into())
                }
            }
        }
    }
}

/// Applies a `put` to the local table.
async fn put(
    repo: &RecordRepository,
    name: &str,
    record_type: Option<&str>,
    field_args: &[String],
    replace: bool,
) -> Result<LocalRecord, Box<dyn std::error::Error>> {
    let mut given = Map::new();
    for arg in field_args {
        let (key, value) = parse_field(arg)?;
        given.insert(key, value);
    }

    let existing = repo.get(name).await?;
    let (record_type, fields) = match existing {
        Some(current) => {
            let record_type = record_type
                .map(str::to_string)
                .unwrap_or(current.record_type);
            let fields = if replace {
                given
            } else {
                let mut merged = current.fields;
                merged.extend(given);
                merged
            };
            (record_type, fields)
        }
        None => {
            let record_type =
                record_type.ok_or("--type is required when creating a record")?;
            (record_type.to_string(), given)
        }
    };

    Ok(repo.save_local_edit(name, &record_type, &fields).await?)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_record(record: &LocalRecord) {
    println!("Name:     {}", record.name);
    println!("Type:     {}", record.record_type);
    println!("State:    {}", record.dirty_state);
    match record.modified_at {
        Some(t) => println!("Synced:   {}", t.to_rfc3339()),
        None => println!("Synced:   never"),
    }
    if !record.fields.is_empty() {
        println!("Fields:");
        for (key, value) in &record.fields {
            println!("  {}: {}", key, format_value(value));
        }
    }
}

fn print_table(records: &[LocalRecord]) {
    if records.is_empty() {
        println!("No records found.");
        return;
    }

    println!("{:<38} {:<16} {:<12}", "NAME", "TYPE", "STATE");
    println!("{}", "-".repeat(66));
    for record in records {
        println!(
            "{:<38} {:<16} {:<12}",
            record.name, record.record_type, record.dirty_state
        );
    }
    println!();
    let pending = records.iter().filter(|r| r.is_pending()).count();
    println!("Total: {} record(s), {} pending sync", records.len(), pending);
}
