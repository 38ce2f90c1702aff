use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pulse_core::{
    collapse_snapshots, compile_prompt, explain, Artifact, Channel, DataSource, FacetSelection,
    Role,
};
use pulse_observability::{init_tracing, PlaybackMetrics};
use pulse_playback::{PlaybackConfig, PlaybackController, PlaybackEvent, PlaybackOutcome};
use pulse_storage::{ConversationStore, Store};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "pulse")]
#[command(about = "Pulse campaign compiler")]
struct Cli {
    #[arg(
        long,
        env = "PULSE_DATABASE_URL",
        default_value = "sqlite://pulse.db?mode=rwc"
    )]
    database_url: String,

    /// Keep conversations in memory only.
    #[arg(long)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Facets {
    /// Data source facet (shopify, facebook, google). Repeatable.
    #[arg(long = "source")]
    sources: Vec<String>,
    /// Channel facet (email, sms, whatsapp, ads). Repeatable.
    #[arg(long = "channel")]
    channels: Vec<String>,
}

impl Facets {
    fn selection(&self) -> Result<FacetSelection> {
        let data_sources = self
            .sources
            .iter()
            .map(|raw| DataSource::parse(raw).with_context(|| format!("unknown source `{raw}`")))
            .collect::<Result<Vec<_>>>()?;
        let channels = self
            .channels
            .iter()
            .map(|raw| Channel::parse(raw).with_context(|| format!("unknown channel `{raw}`")))
            .collect::<Result<Vec<_>>>()?;
        Ok(FacetSelection::new(data_sources, channels))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the compiled campaign payload.
    Compile {
        prompt: String,
        #[command(flatten)]
        facets: Facets,
    },
    /// Print the strategy analysis for a prompt.
    Explain {
        prompt: String,
        #[command(flatten)]
        facets: Facets,
    },
    /// Compile and reveal a campaign. Ctrl-C pauses.
    Play {
        prompt: String,
        #[arg(long)]
        conversation: Option<String>,
        #[command(flatten)]
        facets: Facets,
    },
    Resume {
        #[arg(long)]
        conversation: String,
    },
    Status {
        #[arg(long)]
        conversation: String,
    },
    Discard {
        #[arg(long)]
        conversation: String,
    },
    History {
        #[arg(long)]
        conversation: String,
    },
    Chats {
        #[command(subcommand)]
        command: ChatsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ChatsCommand {
    List,
    New,
    Rename { conversation: String, title: String },
    Delete { conversation: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("pulse_cli");
    let cli = Cli::parse();

    let database_url = (!cli.ephemeral).then_some(cli.database_url.as_str());

    match cli.command {
        Command::Compile { prompt, facets } => {
            let payload = compile_prompt(&prompt, &facets.selection()?);
            println!("{}", payload.to_pretty_json()?);
        }
        Command::Explain { prompt, facets } => {
            let payload = compile_prompt(&prompt, &facets.selection()?);
            println!("{}", explain(&payload, &prompt));
        }
        Command::Play {
            prompt,
            conversation,
            facets,
        } => {
            let facets = facets.selection()?;
            let controller = build_controller(database_url).await?;
            let conversation_id = match conversation {
                Some(id) => id,
                None => {
                    let created = controller.store().create_conversation().await?;
                    eprintln!("conversation {}", created.id);
                    created.id
                }
            };

            let pause = pause_on_ctrl_c();
            let printer = spawn_printer(&controller, &conversation_id);
            let outcome = controller
                .start(&conversation_id, &prompt, &facets, &pause)
                .await;
            report(outcome, printer, &conversation_id).await?;
            print_metrics(&controller);
        }
        Command::Resume { conversation } => {
            let controller = build_controller(database_url).await?;
            let pause = pause_on_ctrl_c();
            let printer = spawn_printer(&controller, &conversation);
            let outcome = controller.resume(&conversation, &pause).await;
            report(outcome, printer, &conversation).await?;
            print_metrics(&controller);
        }
        Command::Status { conversation } => {
            let controller = build_controller(database_url).await?;
            let state = controller.select_conversation(&conversation).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Discard { conversation } => {
            let controller = build_controller(database_url).await?;
            controller.discard(&conversation).await?;
            println!("discarded paused playback for {conversation}");
        }
        Command::History { conversation } => {
            let store = open_store(database_url).await?;
            let messages = store.messages(&conversation).await?;
            for message in collapse_snapshots(&messages) {
                let heading = match message.role {
                    Role::User => "You",
                    Role::System => message
                        .stream_token
                        .as_deref()
                        .and_then(Artifact::from_token)
                        .map(Artifact::label)
                        .unwrap_or("System"),
                };
                println!("## {heading}\n{}\n", message.content);
            }
        }
        Command::Chats { command } => {
            let store = open_store(database_url).await?;
            match command {
                ChatsCommand::List => {
                    let conversations = store.list_conversations().await?;
                    println!("{}", serde_json::to_string_pretty(&conversations)?);
                }
                ChatsCommand::New => {
                    let created = store.create_conversation().await?;
                    println!("{}", serde_json::to_string_pretty(&created)?);
                }
                ChatsCommand::Rename {
                    conversation,
                    title,
                } => store.rename_conversation(&conversation, &title).await?,
                ChatsCommand::Delete { conversation } => {
                    store.delete_conversation(&conversation).await?
                }
            }
        }
    }

    Ok(())
}

async fn open_store(database_url: Option<&str>) -> Result<Store> {
    Store::connect(database_url)
        .await
        .with_context(|| format!("failed opening store at {}", database_url.unwrap_or("memory")))
}

async fn build_controller(database_url: Option<&str>) -> Result<PlaybackController<Store>> {
    let store = open_store(database_url).await?;
    Ok(PlaybackController::new(
        Arc::new(store),
        PlaybackConfig::from_env(),
        PlaybackMetrics::shared(),
    ))
}

fn pause_on_ctrl_c() -> CancellationToken {
    let pause = CancellationToken::new();
    let trigger = pause.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    pause
}

/// Streams snapshot deltas to stdout until the conversation's reveal ends.
fn spawn_printer(
    controller: &PlaybackController<Store>,
    conversation_id: &str,
) -> JoinHandle<Result<()>> {
    let mut events = controller.subscribe();
    let conversation_id = conversation_id.to_string();

    tokio::spawn(async move {
        let mut printed: HashMap<String, usize> = HashMap::new();
        let mut stdout = io::stdout();

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Ok(()),
            };

            match event {
                PlaybackEvent::Snapshot {
                    conversation_id: id,
                    artifact,
                    message,
                } if id == conversation_id => {
                    let token = message.stream_token.clone().unwrap_or_default();
                    let offset = *printed.entry(token.clone()).or_insert_with(|| {
                        let _ = writeln!(stdout, "\n## {}", artifact.label());
                        0
                    });
                    let delta = message.content.get(offset..).unwrap_or_default();
                    write!(stdout, "{delta}")?;
                    stdout.flush()?;
                    printed.insert(token, message.content.len());
                }
                PlaybackEvent::Paused {
                    conversation_id: id,
                    ..
                }
                | PlaybackEvent::Completed {
                    conversation_id: id,
                }
                | PlaybackEvent::Stopped {
                    conversation_id: id,
                } if id == conversation_id => {
                    writeln!(stdout)?;
                    return Ok(());
                }
                _ => {}
            }
        }
    })
}

async fn report(
    outcome: Result<PlaybackOutcome, pulse_playback::PlaybackError>,
    printer: JoinHandle<Result<()>>,
    conversation_id: &str,
) -> Result<()> {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            printer.abort();
            bail!(err);
        }
    };
    printer.await??;

    match outcome {
        PlaybackOutcome::Completed(payload) => {
            eprintln!("campaign {} ready", payload.campaign_id);
        }
        PlaybackOutcome::Paused(checkpoint) => {
            eprintln!(
                "paused {} at unit {}; run `pulse resume --conversation {conversation_id}`",
                checkpoint.artifact().label(),
                match checkpoint.artifact() {
                    Artifact::PayloadJson => checkpoint.json_index,
                    Artifact::Explanation => checkpoint.explanation_index,
                }
            );
        }
        PlaybackOutcome::Stopped => eprintln!("playback stopped"),
    }
    Ok(())
}

fn print_metrics(controller: &PlaybackController<Store>) {
    tracing::debug!(metrics = %controller.metrics().to_json(), "playback metrics");
}
