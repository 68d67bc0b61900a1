//! Mudkit CLI - Inspect the shell grammar and ACL trees
//!
//! Usage:
//!   mudkit tokens 'look | grep sword'            # Print the token stream
//!   mudkit parse 'a && b || c'                   # Print the command tree as JSON
//!   mudkit acl --shadow ./acl --user bob /home/bob/diary
//!   mudkit shell --root ./mudlib                 # Read lines from stdin

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mudkit::acl::{AclEngine, StaticGroups};
use mudkit::fs::{DiskFs, FileManager, PermissiveSecurityManager};
use mudkit::parser::{CommandParser, tokenize};
use mudkit::{Shell, ShellInput, ShellOptions};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Mudkit - MUD command shell and ACL toolkit
#[derive(Parser, Debug)]
#[command(name = "mudkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: SubCmd,
}

/// Options shared by the commands that parse lines
#[derive(clap::Args, Debug, Default)]
struct GrammarArgs {
    /// Use the restricted options of ordinary game verbs
    #[arg(long)]
    restricted: bool,

    /// Define an alias as NAME=TEMPLATE (repeatable)
    #[arg(long = "alias", value_name = "NAME=TEMPLATE")]
    aliases: Vec<String>,

    /// Define a variable as NAME=VALUE (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    variables: Vec<String>,

    /// Add a history entry, oldest first (repeatable)
    #[arg(long = "history", value_name = "LINE")]
    history: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum SubCmd {
    /// Print the tokens of a line
    Tokens {
        line: String,
        #[command(flatten)]
        grammar: GrammarArgs,
    },
    /// Print the command tree of a line as JSON
    Parse {
        line: String,
        #[command(flatten)]
        grammar: GrammarArgs,
    },
    /// Print effective permissions from a shadow tree on disk
    Acl {
        /// Directory holding the `.acl` shadow files
        #[arg(long)]
        shadow: PathBuf,
        /// Identity to resolve for
        #[arg(long)]
        user: String,
        /// Group membership as GROUP=USER (repeatable)
        #[arg(long = "group", value_name = "GROUP=USER")]
        groups: Vec<String>,
        /// Virtual path to check
        path: String,
    },
    /// Read lines from stdin and print what each one means
    Shell {
        /// Host directory mounted at `/` for file expressions
        #[arg(long)]
        root: Option<PathBuf>,
        /// Identity file operations run as
        #[arg(long, default_value = "guest")]
        identity: String,
        #[command(flatten)]
        grammar: GrammarArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Respects RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.command {
        SubCmd::Tokens { line, grammar } => {
            let tokens = tokenize(&line, &grammar.options()?).context("Failed to tokenize line")?;
            for token in tokens {
                println!("{:?} {:?}", token.token_type, token.value);
            }
        }
        SubCmd::Parse { line, grammar } => {
            let parsed = CommandParser::new(line, grammar.options()?)
                .parse_line()
                .context("Failed to parse line")?;
            println!("{}", serde_json::to_string_pretty(&parsed.command)?);
        }
        SubCmd::Acl {
            shadow,
            user,
            groups,
            path,
        } => {
            let perms = effective_permissions(shadow, &user, &groups, &path).await?;
            println!("{path}: {perms}");
        }
        SubCmd::Shell {
            root,
            identity,
            grammar,
        } => run_shell(root, identity, grammar).await?,
    }
    Ok(())
}

impl GrammarArgs {
    fn options(&self) -> Result<ShellOptions> {
        let mut options = if self.restricted {
            ShellOptions::restricted()
        } else {
            ShellOptions::default()
        };
        for alias in &self.aliases {
            let (name, template) = split_pair(alias)?;
            options = options.alias(name, template);
        }
        for variable in &self.variables {
            let (name, value) = split_pair(variable)?;
            options = options.variable(name, value);
        }
        Ok(options.history(self.history.iter().cloned()))
    }
}

fn split_pair(text: &str) -> Result<(&str, &str)> {
    match text.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => bail!("expected NAME=VALUE, got {text:?}"),
    }
}

async fn effective_permissions(
    shadow: PathBuf,
    user: &str,
    groups: &[String],
    path: &str,
) -> Result<mudkit::acl::Permission> {
    if !shadow.is_dir() {
        bail!("shadow directory not found: {}", shadow.display());
    }
    let mut resolver = StaticGroups::new();
    for pair in groups {
        let (group, member) = split_pair(pair)?;
        resolver = resolver.member(group, member);
    }
    let engine = AclEngine::builder()
        .shadow_fs(Arc::new(DiskFs::new(shadow)))
        .groups(resolver)
        .build();
    engine
        .effective_permissions(path, user)
        .await
        .with_context(|| format!("Failed to resolve permissions for {path}"))
}

async fn run_shell(root: Option<PathBuf>, identity: String, grammar: GrammarArgs) -> Result<()> {
    let mut options = grammar.options()?;
    let manager = match root {
        Some(root) => {
            let manager = FileManager::new()?;
            manager.mount(
                "/",
                Arc::new(DiskFs::read_only(root)),
                Arc::new(PermissiveSecurityManager::read_only()),
            )?;
            options.expand_file_expressions = true;
            Some(manager)
        }
        None => None,
    };
    let mut shell = Shell::builder().identity(identity).options(options).build();

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        match shell.process_input(&line) {
            Ok(ShellInput::Empty) | Ok(ShellInput::Incomplete) => {}
            Ok(ShellInput::PrintOnly(text)) => println!("{text}"),
            Ok(ShellInput::Command(mut cmd)) => {
                if let Some(manager) = &manager {
                    shell.expand_file_expressions(&mut cmd, manager).await?;
                }
                println!("{}", serde_json::to_string(&cmd)?);
            }
            Err(e) => eprintln!("{}", shell.format_error(&e)),
        }
    }
    Ok(())
}
