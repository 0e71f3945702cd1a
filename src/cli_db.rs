use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;

use cli_style::{get_styles, print_error, print_success, print_warning, TableBuilder};

use iris_persistence::config::{AppConfig, CliConfig, FileConfig};
use iris_persistence::{Bucket, Collection, Diagnostics, SqliteBucketStore, SqliteDocumentStore};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_collection(s: &str) -> Result<Collection, String> {
    Collection::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown collection '{}', expected one of: {}", s, names.join(", "))
    })
}

fn parse_bucket(s: &str) -> Result<Bucket, String> {
    Bucket::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Bucket::ALL.iter().map(|b| b.as_str()).collect();
        format!("unknown bucket '{}', expected one of: {}", s, names.join(", "))
    })
}

/// Interactive shell to inspect and clean up the persisted state.
#[derive(Parser, Debug)]
#[command(styles=get_styles())]
struct CliArgs {
    /// Directory holding the bucket and document databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[derive(Parser)]
#[command(styles=get_styles(),name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Shows the number of records in each collection.
    Collections,

    /// Prints every record of a collection.
    Dump {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
    },

    /// Deletes every record of a collection.
    Drop {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
    },

    /// Prints a single record.
    Get {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        uri: String,
    },

    /// Shows the buckets currently holding a value.
    Buckets,

    /// Prints the contents of a bucket.
    Bucket {
        #[arg(value_parser = parse_bucket)]
        name: Bucket,
    },

    /// Removes a bucket.
    ClearBucket {
        #[arg(value_parser = parse_bucket)]
        name: Bucket,
    },

    /// Shows the paths of the current databases.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

fn execute_command(
    line: String,
    diagnostics: &Diagnostics,
    config: &AppConfig,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => {
            if let InnerCommand::Exit = cli.command {
                return CommandExecutionResult::Exit;
            }
            if let Err(err) = run_command(cli.command, diagnostics, config) {
                return CommandExecutionResult::Error(format!("{:#}", err));
            }
        }
        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
        }
    }
    CommandExecutionResult::Ok
}

fn run_command(command: InnerCommand, diagnostics: &Diagnostics, config: &AppConfig) -> Result<()> {
    match command {
        InnerCommand::Collections => {
            let mut table = TableBuilder::new(vec!["Collection", "Records"]);
            for (collection, count) in diagnostics.collection_counts()? {
                table.add_row(vec![collection.to_string(), count.to_string()]);
            }
            table.print();
        }
        InnerCommand::Dump { collection } => {
            let documents = diagnostics.dump_collection(collection)?;
            cli_style::print_section_header(collection.as_str());
            if documents.is_empty() {
                cli_style::print_empty_list("no records");
            }
            for document in &documents {
                cli_style::print_json(document);
            }
            cli_style::print_section_footer();
        }
        InnerCommand::Drop { collection } => {
            let removed = diagnostics.drop_collection(collection)?;
            if removed == 0 {
                print_warning(&format!("{} was already empty", collection));
            } else {
                print_success(&format!("Removed {} record(s) from {}", removed, collection));
            }
        }
        InnerCommand::Get { collection, uri } => match diagnostics.get_document(collection, &uri)? {
            Some(document) => cli_style::print_json(&document),
            None => print_warning(&format!("No record {} in {}", uri, collection)),
        },
        InnerCommand::Buckets => {
            let buckets = diagnostics.list_buckets()?;
            cli_style::print_section_header("Buckets");
            if buckets.is_empty() {
                cli_style::print_empty_list("no bucket holds a value");
            }
            for bucket in buckets {
                let keys = diagnostics.dump_bucket(bucket)?.len();
                cli_style::print_key_value(bucket.as_str(), &format!("{} key(s)", keys));
            }
            cli_style::print_section_footer();
        }
        InnerCommand::Bucket { name } => {
            let contents = diagnostics.dump_bucket(name)?;
            if contents.is_empty() {
                print_warning(&format!("Bucket {} is empty", name));
            } else {
                cli_style::print_json(&contents);
            }
        }
        InnerCommand::ClearBucket { name } => {
            if diagnostics.clear_bucket(name)? {
                print_success(&format!("Cleared bucket {}", name));
            } else {
                print_warning(&format!("Bucket {} was already empty", name));
            }
        }
        InnerCommand::Where => {
            cli_style::print_key_value("Buckets", &config.bucket_db_path().display().to_string());
            cli_style::print_key_value(
                "Documents",
                &config.document_db_path().display().to_string(),
            );
        }
        InnerCommand::Exit => {}
    }
    Ok(())
}

#[derive(rustyline_derive::Hinter)]
struct CommandHelper {
    commands_names: Vec<String>,
}

impl CommandHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        CommandHelper { commands_names }
    }
}

impl Completer for CommandHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for CommandHelper {}
impl Validator for CommandHelper {}
impl Helper for CommandHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        log_actions: false,
    };
    let config = AppConfig::resolve(&cli_config, file_config)
        .with_context(|| "Could not resolve the database directory")?;

    let buckets = Arc::new(SqliteBucketStore::new(config.bucket_db_path())?);
    let documents = Arc::new(SqliteDocumentStore::new(config.document_db_path())?);
    let diagnostics = Diagnostics::new(buckets, documents);

    cli_style::print_welcome(&config.db_dir.display().to_string());

    let rl_config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<CommandHelper, FileHistory>::with_config(rl_config)?;
    rl.set_helper(Some(CommandHelper::new()));

    loop {
        let readline = rl.readline(&cli_style::get_prompt());

        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &diagnostics, &config) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => {
                        break;
                    }
                    CommandExecutionResult::Error(err) => {
                        print_error(&err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                print_error(&format!("{:?}", e));
                break;
            }
        }
    }
    cli_style::print_goodbye();
    Ok(())
}
