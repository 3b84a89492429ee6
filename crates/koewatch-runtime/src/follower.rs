//! Notification-log follower: tails the hook runner's JSON-lines log. The
//! file may not exist yet and may become unreadable; both conditions poll
//! instead of failing.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use koewatch_types::NotificationEvent;

use crate::handler::HandlerEvent;

const ABSENT_POLL: Duration = Duration::from_secs(1);
const EOF_POLL: Duration = Duration::from_millis(100);

pub struct NotificationFollower {
    path: PathBuf,
}

impl NotificationFollower {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn run(self, tx: mpsc::Sender<HandlerEvent>, cancel: CancellationToken) {
        let mut permission_logged = false;

        'reopen: loop {
            // wait for the log to appear
            while !self.path.exists() {
                tokio::select! {
                    _ = tokio::time::sleep(ABSENT_POLL) => {}
                    _ = cancel.cancelled() => return,
                }
            }

            let file = match File::open(&self.path).await {
                Ok(file) => file,
                Err(err) => {
                    if err.kind() == ErrorKind::PermissionDenied {
                        if !permission_logged {
                            tracing::warn!(
                                path = %self.path.display(),
                                "notification log is not readable; polling until it is"
                            );
                            permission_logged = true;
                        }
                    } else {
                        tracing::debug!(error = %err, "cannot open notification log");
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(ABSENT_POLL) => continue 'reopen,
                        _ = cancel.cancelled() => return,
                    }
                }
            };
            permission_logged = false;

            let mut reader = BufReader::new(file);
            if reader.seek(SeekFrom::End(0)).await.is_err() {
                tokio::select! {
                    _ = tokio::time::sleep(ABSENT_POLL) => continue 'reopen,
                    _ = cancel.cancelled() => return,
                }
            }

            let mut pending: Vec<u8> = Vec::new();
            let mut chunk: Vec<u8> = Vec::new();
            loop {
                chunk.clear();
                let read = match reader.read_until(b'\n', &mut chunk).await {
                    Ok(read) => read,
                    Err(err) => {
                        if err.kind() == ErrorKind::PermissionDenied && !permission_logged {
                            tracing::warn!(
                                path = %self.path.display(),
                                "notification log read denied; polling"
                            );
                            permission_logged = true;
                        }
                        tokio::select! {
                            _ = tokio::time::sleep(ABSENT_POLL) => continue 'reopen,
                            _ = cancel.cancelled() => return,
                        }
                    }
                };

                if read == 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(EOF_POLL) => continue,
                        _ = cancel.cancelled() => return,
                    }
                }

                pending.extend_from_slice(&chunk);
                if pending.last() != Some(&b'\n') {
                    continue;
                }

                let line = String::from_utf8_lossy(&pending).into_owned();
                pending.clear();

                // decode errors are dropped silently
                if let Some(event) = NotificationEvent::from_line(&line) {
                    if tx.send(HandlerEvent::Notification(event)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_follower_waits_for_missing_file_then_tails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.jsonl");

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let follower = NotificationFollower::new(&path);
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { follower.run(tx, cancel).await })
        };

        // nothing exists yet; the follower is polling
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, "").unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, r#"{{"hook_event_name":"Stop","session_id":"s-1"}}"#).unwrap();
        writeln!(file, "garbage line").unwrap();
        writeln!(file, r#"{{"hook_event_name":"SessionStart","source":"startup"}}"#).unwrap();
        file.flush().unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match first {
            HandlerEvent::Notification(event) => assert_eq!(event.hook_event_name, "Stop"),
            _ => panic!("Expected a notification event"),
        }

        // the garbage line was dropped silently
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match second {
            HandlerEvent::Notification(event) => {
                assert_eq!(event.hook_event_name, "SessionStart");
                assert_eq!(event.source.as_deref(), Some("startup"));
            }
            _ => panic!("Expected a notification event"),
        }

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_follower_skips_preexisting_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.jsonl");
        std::fs::write(&path, "{\"hook_event_name\":\"Stop\"}\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let follower = NotificationFollower::new(&path);
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { follower.run(tx, cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }
}
