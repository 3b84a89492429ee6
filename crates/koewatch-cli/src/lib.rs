//! Wiring for the koewatch binary: build the narrator chain, the speech
//! pipeline and the tailing runtime from the parsed flags, then run until
//! interrupted.

mod args;

pub use args::Cli;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use koewatch_narrator::{NarratorChain, RemoteRewriter, Rewriter, RuleNarrator, RuleSet};
use koewatch_runtime::{
    Config, EventHandler, Formatter, NotificationFollower, ProjectsWatcher, SessionTailer,
    TailerManager, WatchFilters, DEFAULT_SWEEP_INTERVAL, MAILBOX_CAPACITY,
};
use koewatch_speech::{run_speech_worker, SpeechQueue, SpeechSink, VoicevoxSink};

pub fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;
    runtime.block_on(run_with_config(config))
}

async fn run_with_config(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("cannot install signal handler")?;
    }

    let ruleset = RuleSet::load(config.ruleset_path.as_deref())?;
    let narrator = build_narrator(&config, &ruleset)?;
    let speech = build_speech(&config, &cancel).await?;
    let (queue, speech_worker) = match speech {
        Some((queue, worker)) => (Some(queue), Some(worker)),
        None => (None, None),
    };

    let formatter = Formatter::new(narrator, queue.clone(), config.debug);
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let handler = EventHandler::new(rx, formatter, None);
    let handler_task = tokio::spawn(handler.run(cancel.clone()));

    if let Some(file) = &config.file {
        if config.from_start {
            // post-mortem replay: render the whole file, then drain and exit
            let tailer = SessionTailer::new(file);
            tailer.read_from_start(tx.clone()).await?;
            drop(tx);
            cancel.cancel();
            finish(handler_task, queue, speech_worker).await;
            return Ok(());
        }

        tracing::info!(path = %file.display(), "following transcript");
        let tailer = SessionTailer::new(file);
        let tail_tx = tx.clone();
        let tail_cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(err) = tailer.follow(tail_tx, tail_cancel).await {
                tracing::warn!(error = %err, "transcript tailer stopped");
            }
        });
    } else {
        tracing::info!(root = %config.projects_root.display(), "watching transcript root");
        let manager = Arc::new(TailerManager::new(tx.clone(), cancel.clone()));
        manager.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);
        let filters = WatchFilters {
            project: config.project_filter.clone(),
            session: config.session_filter.clone(),
        };
        let watcher = ProjectsWatcher::new(&config.projects_root, filters, manager.clone());
        watcher.start(cancel.clone())?;
    }

    let follower = NotificationFollower::new(&config.notification_log);
    let follower_tx = tx.clone();
    let follower_cancel = cancel.clone();
    tokio::spawn(async move { follower.run(follower_tx, follower_cancel).await });

    drop(tx);
    cancel.cancelled().await;
    finish(handler_task, queue, speech_worker).await;
    Ok(())
}

fn build_narrator(config: &Config, ruleset: &RuleSet) -> Result<Arc<NarratorChain>> {
    let mut rewriters: Vec<Arc<dyn Rewriter>> =
        vec![Arc::new(RuleNarrator::new(ruleset.clone()))];

    if config.remote_enabled {
        match &config.remote_api_key {
            Some(key) => {
                rewriters.push(Arc::new(RemoteRewriter::new(
                    config.remote_endpoint.clone(),
                    key.clone(),
                )?));
                tracing::info!("remote rewriter enabled");
            }
            None => {
                tracing::warn!("remote rewriter requested but no API key found; running rules-only");
            }
        }
    }

    Ok(Arc::new(NarratorChain::new(
        rewriters,
        ruleset.messages.clone(),
    )))
}

async fn build_speech(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Option<(Arc<SpeechQueue>, tokio::task::JoinHandle<()>)>> {
    if !config.speech_enabled {
        return Ok(None);
    }

    let sink = VoicevoxSink::new(config.speech_url.clone(), config.speaker_id)?;
    if !sink.is_available().await {
        tracing::warn!(
            url = %config.speech_url,
            "speech engine is not reachable; continuing without speech"
        );
        return Ok(None);
    }

    let queue = Arc::new(SpeechQueue::new());
    let sink: Arc<dyn SpeechSink> = Arc::new(sink);
    let worker = tokio::spawn(run_speech_worker(queue.clone(), sink, cancel.clone()));
    Ok(Some((queue, worker)))
}

async fn finish(
    handler_task: tokio::task::JoinHandle<()>,
    queue: Option<Arc<SpeechQueue>>,
    speech_worker: Option<tokio::task::JoinHandle<()>>,
) {
    let _ = handler_task.await;
    if let Some(queue) = queue {
        queue.close();
    }
    if let Some(worker) = speech_worker {
        let _ = worker.await;
    }
}
