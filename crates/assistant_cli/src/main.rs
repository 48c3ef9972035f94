//! `assistant`: command-line client for the assistant service.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use assistant_runtime::assistant_api::{
    CancelSignal, IngestBinding, IngestFile, RunFeedback, RunInput, StreamStatus,
    TranscriptShape,
};
use assistant_runtime::{Runtime, RuntimeConfig, Turn};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

mod render;

use render::{memory_line, percent, usage_line, TranscriptPrinter};

#[derive(Parser, Debug)]
#[command(name = "assistant")]
#[command(about = "Talk to an assistant service from the terminal", long_about = None)]
struct Cli {
    /// Service base URL
    #[arg(long, env = "ASSISTANT_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the issued credential
    Login {
        username: String,
        #[arg(long, env = "ASSISTANT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Signup {
        username: String,
        #[arg(long, env = "ASSISTANT_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to the password
        #[arg(long)]
        confirm: Option<String>,
    },
    /// Forget the stored credential
    Logout,
    /// Show the account behind the stored credential
    Whoami,
    /// Send a message and stream the reply
    Chat(ChatArgs),
    /// Start a run in the background without streaming its output
    Run {
        thread_id: String,
        message: Option<String>,
        /// Run configuration as a JSON object
        #[arg(long)]
        config: Option<String>,
    },
    /// Rate a finished run
    Feedback {
        run_id: String,
        key: String,
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Upload files into a thread's document set
    Ingest {
        thread_id: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Attach to an assistant instead of the thread
        #[arg(long)]
        assistant: Option<String>,
    },
    /// Ask the server to stop an ingestion job
    IngestCancel { job_id: String },
    /// Inspect or prune long-term memory
    #[command(subcommand)]
    Memory(MemoryCommand),
}

#[derive(Args, Debug)]
struct ChatArgs {
    thread_id: String,
    message: String,
    /// Send the transcript in the wrapped `{"messages": [...]}` form
    #[arg(long)]
    retrieval: bool,
    /// Files to ingest into the thread before the run starts
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
    /// Run configuration as a JSON object
    #[arg(long)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    List {
        #[arg(long, default_value_t = 200)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Delete {
        memory_id: String,
    },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = RuntimeConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }
    let runtime = Arc::new(Runtime::new(config)?);
    runtime.on_session_end(Arc::new(|| {
        warn!("session expired, run `assistant login` again");
    }));
    debug!(base_url = runtime.config().base_url(), "starting");

    match cli.command {
        Command::Login { username, password } => {
            runtime.auth().login(&username, password.as_deref()).await?;
            println!("logged in as {}", username.trim());
        }
        Command::Signup {
            username,
            password,
            confirm,
        } => {
            let confirm = confirm.unwrap_or_else(|| password.clone());
            runtime.auth().signup(&username, &password, &confirm).await?;
            println!("signed up as {}", username.trim());
        }
        Command::Logout => {
            runtime.auth().logout().await;
            println!("logged out");
        }
        Command::Whoami => {
            if !runtime.store().is_set() {
                println!("not logged in");
            } else {
                match runtime.auth().me().await? {
                    Some(user) => println!("logged in as {}", user.display_name()),
                    None => println!("credential rejected"),
                }
            }
        }
        Command::Run {
            thread_id,
            message,
            config,
        } => {
            let input = match message {
                Some(message) => RunInput::message(message, TranscriptShape::Flat),
                None => RunInput::Resume,
            };
            runtime
                .runs()
                .create_run(input, &thread_id, parse_config(config.as_deref())?)
                .await?;
            println!("run started on {thread_id}");
        }
        Command::Feedback {
            run_id,
            key,
            score,
            comment,
        } => {
            let mut feedback = RunFeedback::new(run_id, key);
            if let Some(score) = score {
                feedback = feedback.with_score(score);
            }
            if let Some(comment) = comment {
                feedback = feedback.with_comment(comment);
            }
            runtime.runs().feedback(&feedback).await?;
            println!("feedback sent");
        }
        Command::Chat(args) => chat(runtime, args).await?,
        Command::Ingest {
            thread_id,
            paths,
            assistant,
        } => {
            let binding = match assistant {
                Some(assistant_id) => IngestBinding::Assistant(assistant_id),
                None => IngestBinding::Thread(thread_id),
            };
            ingest(runtime, paths, binding).await?;
        }
        Command::IngestCancel { job_id } => {
            runtime.ingest().cancel(&job_id).await?;
            println!("cancel requested for {job_id}");
        }
        Command::Memory(command) => memory(&runtime, command).await?,
    }

    Ok(())
}

async fn chat(runtime: Arc<Runtime>, args: ChatArgs) -> Result<()> {
    let config = parse_config(args.config.as_deref())?;
    let shape = if args.retrieval {
        TranscriptShape::Wrapped
    } else {
        TranscriptShape::Flat
    };
    let attachments = read_files(&args.attachments).await?;
    let turn = Turn::new(args.thread_id, RunInput::message(args.message, shape))
        .with_config(config)
        .with_attachments(attachments);

    let cancel = CancelSignal::new();
    let interrupt = spawn_interrupt(Arc::clone(&runtime), cancel.clone());
    let printer = Arc::new(Mutex::new(TranscriptPrinter::new()));
    let updates = spawn_printer(&runtime, Arc::clone(&printer));

    let result = runtime
        .send_turn(turn, progress_printer(), Some(&cancel))
        .await;
    interrupt.abort();
    updates.abort();

    let state = match result {
        Ok(state) => state,
        Err(error) if error.is_cancelled() => {
            println!();
            info!("turn stopped");
            return Ok(());
        }
        Err(error) => {
            println!();
            return Err(error.into());
        }
    };

    // Flush whatever arrived after the printer's last wakeup.
    print_flush(&lock_unpoisoned(&printer).update(&state));
    println!();

    if state.status == StreamStatus::Done {
        if let Some(usage) = &state.usage {
            println!("{}", usage_line(usage));
        }
    }
    Ok(())
}

fn parse_config(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    let value: Value = serde_json::from_str(raw).context("--config is not valid JSON")?;
    if !value.is_object() {
        bail!("--config must be a JSON object");
    }
    Ok(value)
}

async fn ingest(runtime: Arc<Runtime>, paths: Vec<PathBuf>, binding: IngestBinding) -> Result<()> {
    let files = read_files(&paths).await?;
    let Some(job_id) = runtime.ingest().submit(files, &binding).await? else {
        println!("nothing to ingest");
        return Ok(());
    };

    let cancel = CancelSignal::new();
    let interrupt = spawn_interrupt(Arc::clone(&runtime), cancel.clone());
    let result = runtime
        .ingest()
        .poll(&job_id, progress_printer(), Some(&cancel))
        .await;
    interrupt.abort();

    match result {
        Ok(()) => println!("\ringested ({job_id})"),
        Err(error) if error.is_cancelled() => {
            // A job the server already canceled needs no remote cancel.
            if cancel.is_cancelled() {
                runtime.ingest().cancel(&job_id).await?;
            }
            println!("\ringest {job_id} stopped");
        }
        Err(error) => return Err(error.into()),
    }
    Ok(())
}

async fn memory(runtime: &Runtime, command: MemoryCommand) -> Result<()> {
    match command {
        MemoryCommand::List { limit, offset } => {
            for item in runtime.memory().list(limit, offset).await? {
                println!("{}", memory_line(&item));
            }
        }
        MemoryCommand::Delete { memory_id } => {
            if runtime.memory().delete(&memory_id).await? {
                println!("deleted {memory_id}");
            } else {
                println!("{memory_id} was not found");
            }
        }
        MemoryCommand::Clear => {
            let deleted = runtime.memory().clear().await?;
            println!("deleted {deleted} memories");
        }
    }
    Ok(())
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<IngestFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(IngestFile::from_path(path).await?);
    }
    Ok(files)
}

/// Ctrl-C raises `cancel` and stops any run in flight, keeping its transcript.
fn spawn_interrupt(runtime: Arc<Runtime>, cancel: CancelSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "failed to listen for Ctrl-C");
            return;
        }
        cancel.cancel();
        runtime.stream().stop(false);
    })
}

fn spawn_printer(runtime: &Runtime, printer: Arc<Mutex<TranscriptPrinter>>) -> JoinHandle<()> {
    let mut updates = runtime.stream().subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let Some(state) = updates.borrow_and_update().clone() else {
                continue;
            };
            print_flush(&lock_unpoisoned(&printer).update(&state));
        }
    })
}

fn progress_printer() -> impl FnMut(f64) {
    |fraction| eprint!("\ruploading {:>3}%", percent(fraction))
}

fn print_flush(text: &str) {
    if text.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("assistant_api=debug,assistant_runtime=debug,assistant_cli=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("assistant_api=info,assistant_runtime=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
