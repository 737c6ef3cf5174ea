//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise the entity façade end to end against a SQLite file.
//! - Print every result as JSON; façade failures go to stderr as
//!   `{"status": ..., "error": ...}`.

mod contact;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contact::Contact;
use facade_core::db::open_db;
use facade_core::{
    core_version, default_log_level, init_logging, Entity, EntityFacade, EntityId, FacadeConfig,
    FacadeError, FacadeResult, Managed, OnMissing, Session, SqliteStore, UnitOfWorkSession,
};
use log::info;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "facade", version, about = "Inspect and edit contacts through the entity façade")]
struct Cli {
    /// SQLite database file; created and migrated on first use.
    #[arg(long, default_value = "facade.db")]
    db: PathBuf,

    /// JSON file with `flush_policy`, `not_found_message` and `query_alias`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for rolling log files. Logging stays off when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long, default_value_t = default_log_level().to_string())]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a find-or-create input: `null`, an id or a JSON object.
    Resolve {
        input: String,
        /// Validate, save and flush the resolved contact.
        #[arg(long)]
        save: bool,
    },
    /// Fetch one contact by id.
    Get { id: EntityId },
    /// List contacts one page at a time.
    List {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        per_page: u64,
    },
    /// Remove a contact by id.
    Remove { id: EntityId },
    /// Print the core crate version.
    Version,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<FacadeError>() {
                Some(facade_err) => eprintln!(
                    "{}",
                    json!({ "status": facade_err.status_code(), "error": facade_err.payload() })
                ),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(dir) = &cli.log_dir {
        let dir = std::path::absolute(dir).context("resolving log directory")?;
        init_logging(&cli.log_level, &dir.to_string_lossy())?;
    }

    let output = match cli.command {
        Command::Version => json!({ "core_version": core_version() }),
        command => {
            let config = load_config(cli.config.as_deref())?;
            execute(&cli.db, config, command)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FacadeConfig> {
    let Some(path) = path else {
        return Ok(FacadeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    FacadeConfig::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn execute(db: &Path, config: FacadeConfig, command: Command) -> Result<Value> {
    let conn = open_db(db).with_context(|| format!("opening {}", db.display()))?;
    let store = SqliteStore::try_new(&conn)?;
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::with_config(&session, config);
    info!(
        "event=cli_command module=cli status=start session_id={} command={command:?}",
        session.id()
    );

    match command {
        Command::Resolve { input, save } => {
            let Some(contact) = facade.find_or_create(input)? else {
                return Ok(Value::Null);
            };
            if save {
                save_contact(&facade, &contact)?;
            }
            to_json(&contact)
        }
        Command::Get { id } => match facade.find(id, OnMissing::Abort)? {
            Some(contact) => to_json(&contact),
            None => Ok(Value::Null),
        },
        Command::List { page, per_page } => {
            let worker = facade.find_all().paginate(page, per_page);
            Ok(json!({
                "total": worker.count()?,
                "page": page.max(1),
                "items": worker.to_array()?,
            }))
        }
        Command::Remove { id } => {
            let contact = facade.remove(id)?;
            facade.flush(None)?;
            to_json(&contact)
        }
        Command::Version => Ok(json!({ "core_version": core_version() })),
    }
}

/// Normalizes through `save` first so validation sees the stored form.
fn save_contact<S: Session>(
    facade: &EntityFacade<'_, Contact, S>,
    contact: &Managed<Contact>,
) -> FacadeResult<()> {
    facade.save(contact)?;
    facade.validate(&contact.borrow())?;
    facade.flush(Some(contact))?;
    Ok(())
}

fn to_json(contact: &Managed<Contact>) -> Result<Value> {
    Ok(Value::Object(contact.borrow().to_properties()?))
}

#[cfg(test)]
mod tests {
    use super::save_contact;
    use crate::contact::Contact;
    use facade_core::session::managed;
    use facade_core::{EntityFacade, FacadeError, MemoryStore, UnitOfWorkSession};

    fn contact(name: &str, email: &str) -> Contact {
        Contact {
            id: None,
            name: name.to_string(),
            email: email.to_string(),
            age: 30,
        }
    }

    #[test]
    fn save_contact_validates_the_normalized_record() {
        let store = MemoryStore::new();
        let session = UnitOfWorkSession::new(&store);
        let facade = EntityFacade::<Contact, _>::new(&session);
        let padded = managed(contact("  Ana ", " A@B.COM "));

        save_contact(&facade, &padded).unwrap();

        assert_eq!(padded.borrow().id, Some(1));
        assert_eq!(padded.borrow().email, "a@b.com");
        assert_eq!(store.get("contact", 1).unwrap()["name"], "Ana");
    }

    #[test]
    fn save_contact_rejects_invalid_records_without_writing() {
        let store = MemoryStore::new();
        let session = UnitOfWorkSession::new(&store);
        let facade = EntityFacade::<Contact, _>::new(&session);

        let err = save_contact(&facade, &managed(contact(" ", "nope"))).unwrap_err();

        assert!(matches!(err, FacadeError::Validation(ref messages) if messages.len() == 2));
        assert!(store.is_empty("contact"));
    }
}
