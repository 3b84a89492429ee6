//! End-to-end runtime pipeline: a transcript file appears under the watched
//! root, its appended lines flow through the tailer and handler, and the
//! rendered blocks reach the broadcast surface.

use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use koewatch_narrator::{NarratorChain, RuleNarrator, RuleSet};
use koewatch_runtime::{
    Broadcast, BroadcastMessage, EventHandler, Formatter, ProjectsWatcher, TailerManager,
    WatchFilters, MAILBOX_CAPACITY,
};

struct Capture {
    blocks: Mutex<Vec<BroadcastMessage>>,
}

impl Capture {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            blocks: Mutex::new(Vec::new()),
        })
    }

    fn texts(&self) -> Vec<String> {
        self.blocks
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl Broadcast for Capture {
    async fn send(&self, message: BroadcastMessage) {
        self.blocks.lock().unwrap().push(message);
    }
}

fn formatter() -> Formatter {
    let rules: Arc<dyn koewatch_narrator::Rewriter> =
        Arc::new(RuleNarrator::new(RuleSet::embedded()));
    let chain = Arc::new(NarratorChain::new(vec![rules], RuleSet::embedded().messages));
    Formatter::new(chain, None, false)
}

#[tokio::test]
async fn test_transcript_append_reaches_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("projects");
    let project = root.join("demo");
    std::fs::create_dir_all(&project).unwrap();

    let capture = Capture::new();
    let cancel = CancellationToken::new();

    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let handler = EventHandler::new(rx, formatter(), Some(capture.clone()));
    let handler_task = tokio::spawn(handler.run(cancel.clone()));

    let manager = Arc::new(TailerManager::new(tx.clone(), cancel.clone()));
    let watcher = ProjectsWatcher::new(&root, WatchFilters::default(), manager.clone());
    let watcher_task = watcher.start(cancel.clone()).unwrap();
    drop(tx);

    tokio::time::sleep(Duration::from_millis(300)).await;

    // a new session transcript appears and starts the tailer
    let transcript = project.join("sess-e2e.jsonl");
    std::fs::write(&transcript, "").unwrap();

    let mut started = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if manager.active_count() == 1 {
            started = true;
            break;
        }
    }
    assert!(started, "watcher did not start a tailer");

    // give the tailer time to seek to the end before appending
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&transcript)
        .unwrap();
    writeln!(
        file,
        r#"{{"type":"assistant","uuid":"a1","parentUuid":"u0","timestamp":"2025-03-01T09:00:00Z","message":{{"model":"m","content":[{{"type":"tool_use","id":"t1","name":"Bash","input":{{"command":"git push"}}}}]}}}}"#
    )
    .unwrap();
    file.flush().unwrap();

    let mut rendered = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if capture
            .texts()
            .iter()
            .any(|t| t.contains("変更をリモートにプッシュします"))
        {
            rendered = true;
            break;
        }
    }
    assert!(rendered, "appended line was not rendered");

    cancel.cancel();
    manager.stop();
    let _ = watcher_task.await;
    let _ = handler_task.await;
}

#[tokio::test]
async fn test_task_lifecycle_across_pipeline() {
    // Direct handler feed: Task call then its result, interleaved with a
    // sidechain event that must stay invisible.
    let capture = Capture::new();
    let cancel = CancellationToken::new();

    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let handler = EventHandler::new(rx, formatter(), Some(capture.clone()));
    let handler_task = tokio::spawn(handler.run(cancel.clone()));

    let parser = koewatch_types::EventParser::new(std::path::Path::new(
        "/root/.claude/projects/demo/sess-1.jsonl",
    ));
    let send = |line: &str| {
        let event = parser.parse_line(line).unwrap();
        koewatch_runtime::HandlerEvent::Transcript(event)
    };

    tx.send(send(
        r#"{"type":"assistant","uuid":"a1","parentUuid":"p0","timestamp":"2025-03-01T09:00:00Z","message":{"model":"m","content":[{"type":"tool_use","id":"task-1","name":"Task","input":{"description":"refactor","subagent_type":"code-fixer"}}]}}"#,
    ))
    .await
    .unwrap();
    tx.send(send(
        r#"{"type":"assistant","uuid":"side","parentUuid":"p0","isSidechain":true,"timestamp":"2025-03-01T09:00:00Z","message":{"model":"m","content":[{"type":"text","text":"hidden\nhidden"}]}}"#,
    ))
    .await
    .unwrap();
    tx.send(send(
        r#"{"type":"user","uuid":"u1","parentUuid":"a1","timestamp":"2025-03-01T09:00:01Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"task-1"}]}}"#,
    ))
    .await
    .unwrap();
    drop(tx);

    let _ = handler_task.await;
    cancel.cancel();

    let texts = capture.texts();
    assert!(texts
        .iter()
        .any(|t| t.contains("code-fixer agentがタスク「refactor」を完了しました")));
    assert!(!texts.iter().any(|t| t.contains("hidden")));

    // completion precedes the user event that carried the result
    let completion_index = texts
        .iter()
        .position(|t| t.contains("完了しました"))
        .unwrap();
    let user_index = texts.iter().position(|t| t.contains("Tool Result")).unwrap();
    assert!(completion_index < user_index);
}
