//! Wakeprompt application binary - composition root.
//!
//! Ties the Wakeprompt crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open storage (SQLite records, sound files, credential file)
//! 3. Build the providers and the orchestrator
//! 4. Dispatch the CLI command, or run the alarm daemon

mod cli;

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use wakeprompt_alarm::{AlarmError, Collaborators, LocalAlarmBackbone, Orchestrator};
use wakeprompt_core::config::WakepromptConfig;
use wakeprompt_core::ports::{apply_credential_input, CredentialStore};
use wakeprompt_core::telemetry::JsonlTelemetry;
use wakeprompt_core::types::{Alarm, AlarmFiring, AlarmState, Voice};
use wakeprompt_providers::{OpenAiSpeechProvider, OpenAiTextProvider, ReqwestTransport};
use wakeprompt_storage::{Database, FileCredentialStore, FsAudioStore, SqliteAlarmRepository};

use cli::{resolve_fire_time, CliArgs, Command, KeyAction};

/// How often the daemon compares stored alarms with its registrations.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    // Config is read before logging starts so its log level applies.
    let config_path = args.resolve_config_path();
    let (mut config, load_error) = if config_path.exists() {
        match WakepromptConfig::load(&config_path) {
            Ok(config) => (config, None),
            Err(e) => (WakepromptConfig::default(), Some(e)),
        }
    } else {
        (WakepromptConfig::default(), None)
    };

    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    if let Some(e) = load_error {
        tracing::warn!(
            path = %config_path.display(),
            error = %e,
            "Failed to load config, using defaults"
        );
    }
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    config.validate()?;
    tracing::debug!(data_dir = %config.data_dir().display(), "Configuration resolved");

    let credentials = Arc::new(FileCredentialStore::new(config.credential_path()));

    let db = Arc::new(Database::new(&config.database_path())?);
    let repository = Arc::new(SqliteAlarmRepository::new(db));
    let transport = Arc::new(ReqwestTransport::from_config(&config.provider)?);
    let text = Arc::new(OpenAiTextProvider::new(
        transport.clone(),
        credentials.clone(),
        config.provider.clone(),
    ));
    let speech = Arc::new(OpenAiSpeechProvider::new(
        transport,
        credentials.clone(),
        config.provider.clone(),
    ));
    let audio = Arc::new(FsAudioStore::new(config.sounds_dir()));
    let (backbone, firings) = LocalAlarmBackbone::new(config.alarm.permission_granted);
    let backbone = Arc::new(backbone);
    let telemetry = Arc::new(JsonlTelemetry::open(&config.telemetry_path())?);

    let orchestrator = Orchestrator::new(Collaborators {
        repository,
        text,
        speech,
        audio,
        credentials: credentials.clone(),
        backbone: backbone.clone(),
        telemetry,
    });

    match args.command {
        Command::Create {
            at,
            fire_at,
            voice,
            prompt,
        } => {
            let fire_time = resolve_fire_time(at.as_deref(), fire_at.as_deref(), &Local::now())?;
            let voice = match voice {
                Some(v) => v.parse::<Voice>()?,
                None => config.alarm.default_voice,
            };
            let prompt = prompt.filter(|p| !p.trim().is_empty());
            let alarm = orchestrator
                .save_alarm(Alarm::new(fire_time, voice, prompt))
                .await?;
            print_detail(&alarm);
            if alarm.state == AlarmState::Armed {
                println!("Keep `wakeprompt run` running for the alarm to ring.");
            }
        }
        Command::List => {
            let alarms = orchestrator.list()?;
            if alarms.is_empty() {
                println!("No alarms.");
            }
            for alarm in &alarms {
                print_row(alarm);
            }
        }
        Command::Show { id } => {
            let id = resolve_id(&orchestrator, &id)?;
            let alarm = orchestrator.get(id)?.ok_or(AlarmError::NotFound(id))?;
            print_detail(&alarm);
        }
        Command::Regenerate { id } => {
            let id = resolve_id(&orchestrator, &id)?;
            let alarm = orchestrator.regenerate(id).await?;
            print_detail(&alarm);
        }
        Command::Cancel { id } => {
            let id = resolve_id(&orchestrator, &id)?;
            let alarm = orchestrator.cancel(id).await?;
            println!("Cancelled {}", alarm.short_id());
        }
        Command::Delete { id } => {
            let id = resolve_id(&orchestrator, &id)?;
            if orchestrator.delete(id).await? {
                println!("Deleted {}", wakeprompt_core::types::short_id(id));
            } else {
                println!("Nothing to delete");
            }
        }
        Command::Run => run_daemon(&orchestrator, &backbone, firings).await?,
        Command::Key { action } => run_key(&action, credentials.as_ref())?,
    }

    Ok(())
}

fn run_key(action: &KeyAction, credentials: &dyn CredentialStore) -> AppResult<()> {
    match action {
        KeyAction::Set { value } => {
            let input = match value {
                Some(v) => v.clone(),
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line
                }
            };
            if apply_credential_input(credentials, &input)? {
                println!("API key stored");
            } else {
                println!("API key removed");
            }
        }
        KeyAction::Clear => {
            credentials.delete()?;
            println!("API key removed");
        }
        KeyAction::Status => {
            if credentials.has_credential() {
                println!("API key is set");
            } else {
                println!("No API key stored");
            }
        }
    }
    Ok(())
}

/// Accept a full UUID or a unique prefix of the short id.
fn resolve_id(orchestrator: &Orchestrator, input: &str) -> AppResult<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    let prefix = input.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        return Err("alarm id is empty".into());
    }
    let matches: Vec<Uuid> = orchestrator
        .list()?
        .into_iter()
        .map(|alarm| alarm.id)
        .filter(|id| id.simple().to_string().starts_with(&prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(format!("no alarm matches '{}'", input).into()),
        _ => Err(format!("'{}' matches {} alarms", input, matches.len()).into()),
    }
}

/// Keep registrations alive and record firings until Ctrl-C.
async fn run_daemon(
    orchestrator: &Orchestrator,
    backbone: &LocalAlarmBackbone,
    mut firings: UnboundedReceiver<AlarmFiring>,
) -> AppResult<()> {
    let report = orchestrator.recover().await?;
    tracing::info!(
        interrupted = report.interrupted.len(),
        rearmed = report.rearmed.len(),
        blocked = report.blocked.len(),
        "Daemon started"
    );

    let mut reconcile_tick = tokio::time::interval(RECONCILE_INTERVAL);
    loop {
        tokio::select! {
            firing = firings.recv() => {
                let Some(firing) = firing else { break };
                match orchestrator.record_fired(firing.id, firing.mode).await {
                    Ok(None) => {}
                    Ok(Some(alarm)) => println!(
                        "[{}] Alarm {} ({})",
                        firing.fired_at.with_timezone(&Local).format("%H:%M"),
                        alarm.short_id(),
                        firing.mode.label()
                    ),
                    Err(e) => tracing::warn!(alarm = %firing.id, error = %e, "Failed to record firing"),
                }
            }
            _ = reconcile_tick.tick() => {
                if let Err(e) = orchestrator.reconcile(backbone.registrations()).await {
                    tracing::warn!(error = %e, "Reconciliation failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    backbone.shutdown();
    Ok(())
}

fn print_row(alarm: &Alarm) {
    let mut line = format!(
        "{}  {}  {:<7}  {}",
        alarm.short_id(),
        alarm.fire_time.with_timezone(&Local).format("%a %d %b %H:%M"),
        alarm.voice.as_str(),
        alarm.state.label()
    );
    if let Some(reason) = &alarm.failure_reason {
        line.push_str(&format!("  ({})", reason));
    }
    println!("{}", line);
}

fn print_detail(alarm: &Alarm) {
    println!("Alarm      {}", alarm.id);
    println!(
        "Fires at   {}",
        alarm.fire_time.with_timezone(&Local).format("%A %d %B %Y %H:%M")
    );
    println!("Voice      {}", alarm.voice.as_str());
    println!("Prompt     {}", alarm.effective_prompt());
    println!("State      {}", alarm.state.label());
    println!("Enabled    {}", alarm.enabled);
    if let Some(text) = alarm.artifacts.text() {
        println!("Message    {}", text);
    }
    if let Some(name) = alarm.artifacts.audio_filename() {
        let secs = alarm.artifacts.audio_duration_secs().unwrap_or_default();
        println!("Sound      {} ({:.1}s)", name, secs);
    }
    if let Some(mode) = alarm.fired_mode {
        println!("Fired      {}", mode.label());
    }
    if let Some(reason) = &alarm.failure_reason {
        println!("Reason     {}", reason);
    }
}
