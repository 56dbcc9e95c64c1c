//! Read, render and publish loop for tracked sessions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::fs_watcher::WatchEvent;
use crate::broadcast::{BroadcastHub, SubscriberKind};
use crate::registry::{SessionRecord, SessionRegistry};
use crate::render::MessageRenderer;

/// Default period of the fallback sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Connects file changes to the registry and the broadcast hub.
#[derive(Debug, Clone)]
pub struct LivePipeline {
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
    renderer: Arc<dyn MessageRenderer>,
    include_subagents: bool,
    sweep_interval: Duration,
}

impl LivePipeline {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        hub: Arc<BroadcastHub>,
        renderer: Arc<dyn MessageRenderer>,
    ) -> Self {
        Self {
            registry,
            hub,
            renderer,
            include_subagents: false,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_include_subagents(mut self, include: bool) -> Self {
        self.include_subagents = include;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    #[must_use]
    pub fn renderer(&self) -> &Arc<dyn MessageRenderer> {
        &self.renderer
    }

    /// Track the most recent sessions of every backend. Returns how many were added.
    pub async fn initial_scan(&self) -> usize {
        let recent = self
            .registry
            .backends()
            .find_recent_sessions(self.registry.max_sessions(), self.include_subagents);
        let mut added = 0;
        for path in recent {
            if self.track_session(&path).await.is_some() {
                added += 1;
            }
        }
        tracing::info!(sessions = added, "Initial scan complete");
        added
    }

    /// Startup tracking: the recent-session scan, then each explicit path.
    ///
    /// Explicit paths go last so eviction at the limit never drops them.
    /// Discovery stays on afterwards. Returns how many sessions were added.
    pub async fn track_startup(&self, explicit: &[PathBuf]) -> usize {
        let mut added = self.initial_scan().await;
        for path in explicit {
            if self.registry.is_known_file(path) {
                continue;
            }
            if self.track_session(path).await.is_some() {
                tracing::info!(path = %path.display(), "Tracking requested session");
                added += 1;
            } else {
                tracing::warn!(path = %path.display(), "Requested session could not be tracked");
            }
        }
        added
    }

    /// Add one session and announce it, replaying its history to live subscribers.
    pub async fn track_session(&self, path: &Path) -> Option<Arc<SessionRecord>> {
        let added = match self.registry.add_session(path, true).await {
            Ok(added) => added,
            Err(e) if e.is_skip() => {
                tracing::debug!(path = %path.display(), reason = %e, "Skipping session");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to add session");
                return None;
            }
        };

        if let Some(evicted) = &added.evicted {
            self.hub.session_removed(evicted);
        }
        self.hub.session_added(&added.record.info().await);
        self.catchup(&added.record).await;
        Some(added.record)
    }

    async fn catchup(&self, record: &SessionRecord) {
        if !self.hub.has_subscribers(SubscriberKind::Rich)
            && !self.hub.has_subscribers(SubscriberKind::Structured)
        {
            return;
        }
        // History and live reads share the tailer, so the live offset ends
        // exactly where the replay stopped.
        let mut tailer = record.tailer().lock().await;
        tailer.reset();
        let entries = tailer.read_new_lines().await;
        let fragments: Vec<String> = entries.iter().filter_map(|e| self.renderer.render(e)).collect();
        let messages: Vec<_> = entries.into_iter().map(|e| e.message).collect();
        self.hub.catchup(record.id(), &fragments, &messages);
    }

    /// Read new entries of one session and publish them in file order.
    ///
    /// Returns the number of entries read.
    pub async fn process_session_messages(&self, session_id: &str) -> usize {
        let Some(record) = self.registry.get(session_id) else {
            return 0;
        };

        let count = {
            let mut tailer = record.tailer().lock().await;
            let entries = tailer.read_new_lines().await;
            for entry in &entries {
                if let Some(html) = self.renderer.render(entry) {
                    self.hub.broadcast_rich_message(session_id, &html);
                }
                self.hub.broadcast_structured_message(session_id, &entry.message);
            }
            entries.len()
        };

        tracing::debug!(session_id, entries = count, "Processed session messages");
        if count > 0 {
            self.hub.session_status(&record.status().await);
        }
        count
    }

    /// Reload a session's summary side-car and announce the new values.
    pub async fn process_summary_update(&self, session_id: &str) -> bool {
        let Some(record) = self.registry.get(session_id) else {
            tracing::debug!(session_id, "Summary for untracked session");
            return false;
        };
        if !record.reload_summary() {
            return false;
        }

        let summary = record.summary().unwrap_or_default();
        tracing::info!(session_id, title = ?summary.title, "Summary updated");
        self.hub.broadcast_dual(
            "session_summary_updated",
            json!({
                "session_id": session_id,
                "summaryTitle": summary.title,
                "summaryShort": summary.short_summary,
                "summaryExecutive": summary.executive_summary,
            }),
        );
        true
    }

    /// Track recent sessions that are not known yet. Returns how many were added.
    pub async fn check_for_new_sessions(&self) -> usize {
        let recent = self
            .registry
            .backends()
            .find_recent_sessions(self.registry.max_sessions(), self.include_subagents);
        let mut added = 0;
        for path in recent {
            if !self.registry.is_known_file(&path) && self.track_session(&path).await.is_some() {
                added += 1;
            }
        }
        added
    }

    /// React to one batch of changed paths from the watcher.
    pub async fn handle_changed_paths(&self, paths: &[PathBuf]) {
        let mut to_process: Vec<String> = Vec::new();
        let mut summaries: Vec<String> = Vec::new();
        let mut vanished: Vec<String> = Vec::new();
        let mut need_new_session_check = false;

        for path in paths {
            let Some(backend) = self.registry.backends().for_path(path) else {
                continue;
            };
            if !backend.should_watch_file(path, self.include_subagents) {
                continue;
            }

            match backend.session_id_from_changed_file(path) {
                Some(id) if self.registry.contains(&id) => {
                    let bucket = if backend.is_summary_file(path) {
                        &mut summaries
                    } else if self.registry.is_known_file(path) && !path.exists() {
                        &mut vanished
                    } else {
                        &mut to_process
                    };
                    if !bucket.contains(&id) {
                        bucket.push(id);
                    }
                }
                _ => need_new_session_check = true,
            }
        }

        for id in &vanished {
            self.drop_session(id);
        }
        if need_new_session_check {
            self.check_for_new_sessions().await;
        }
        for id in &to_process {
            self.process_session_messages(id).await;
        }
        for id in &summaries {
            self.process_summary_update(id).await;
        }
    }

    /// Fallback pass over all tracked sessions for missed notifications.
    pub async fn sweep(&self) {
        for record in self.registry.records() {
            if !tokio::fs::try_exists(record.path()).await.unwrap_or(false) {
                self.drop_session(record.id());
            } else if record.needs_read().await {
                self.process_session_messages(record.id()).await;
            }
        }
    }

    /// Drive the pipeline until `cancel` fires.
    ///
    /// If the watcher channel closes, the periodic sweep keeps sessions live.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<WatchEvent>, cancel: CancellationToken) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.tick().await;

        let mut watching = true;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Pipeline stopped");
                    break;
                }
                event = events.recv(), if watching => match event {
                    Some(WatchEvent::Changed(paths)) => {
                        tracing::debug!(paths = paths.len(), "Change batch");
                        self.handle_changed_paths(&paths).await;
                    }
                    Some(WatchEvent::Error(e)) => {
                        tracing::warn!(error = %e, "Watcher error");
                    }
                    None => {
                        tracing::warn!("Watcher channel closed, relying on periodic sweep");
                        watching = false;
                    }
                },
                _ = sweep.tick() => self.sweep().await,
            }
        }
    }

    fn drop_session(&self, session_id: &str) {
        if self.registry.remove_session(session_id).is_some() {
            self.hub.session_removed(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendSet, ClaudeCodeBackend};
    use crate::broadcast::{BroadcastEvent, Subscription};
    use crate::render::HtmlRenderer;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    const USER_LINE: &str = r#"{"type":"user","timestamp":"2026-01-29T10:00:00Z","message":{"role":"user","content":"Run the tests"}}"#;
    const ASSISTANT_LINE: &str = r#"{"type":"assistant","timestamp":"2026-01-29T10:00:04Z","message":{"role":"assistant","stop_reason":"end_turn","content":[{"type":"text","text":"All green"}]}}"#;

    struct Fixture {
        dir: TempDir,
        pipeline: LivePipeline,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("-tmp-demo")).unwrap();
            let backends =
                BackendSet::new().with(Arc::new(ClaudeCodeBackend::new(dir.path().to_path_buf())));
            let pipeline = LivePipeline::new(
                Arc::new(SessionRegistry::new(backends, 10)),
                Arc::new(BroadcastHub::new()),
                Arc::new(HtmlRenderer::new()),
            );
            Self { dir, pipeline }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join("-tmp-demo").join(name)
        }

        fn append(&self, name: &str, lines: &[&str]) -> PathBuf {
            let path = self.path(name);
            let mut file = OpenOptions::new().create(true).append(true).open(&path).unwrap();
            for line in lines {
                writeln!(file, "{line}").unwrap();
            }
            path
        }
    }

    fn drain(subscription: &mut Subscription) -> Vec<BroadcastEvent> {
        std::iter::from_fn(|| subscription.try_recv()).collect()
    }

    fn names(events: &[BroadcastEvent]) -> Vec<&str> {
        events.iter().map(|event| event.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_track_session_replays_history_to_subscribers() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE, ASSISTANT_LINE]);
        let mut rich = fx.pipeline.hub().subscribe(SubscriberKind::Rich);
        let mut structured = fx.pipeline.hub().subscribe(SubscriberKind::Structured);

        let record = fx.pipeline.track_session(&path).await.unwrap();
        assert_eq!(record.id(), "s1");

        let rich_events = drain(&mut rich);
        assert_eq!(names(&rich_events), ["session_added", "message", "message"]);
        assert_eq!(rich_events[0].payload["id"], "s1");
        assert_eq!(rich_events[1].payload["type"], "html");

        let structured_events = drain(&mut structured);
        assert_eq!(names(&structured_events), ["session_added", "session_catchup"]);
        assert_eq!(
            structured_events[1].payload["messages"].as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_line_appended_before_catchup_is_sent_once() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        let mut structured = fx.pipeline.hub().subscribe(SubscriberKind::Structured);

        let added = fx.pipeline.registry().add_session(&path, true).await.unwrap();
        fx.append("s1.jsonl", &[ASSISTANT_LINE]);
        fx.pipeline.catchup(&added.record).await;
        fx.pipeline.process_session_messages("s1").await;

        let events = drain(&mut structured);
        assert_eq!(names(&events), ["session_catchup"]);
        let occurrences: usize = events
            .iter()
            .map(|event| event.payload.to_string().matches("All green").count())
            .sum();
        assert_eq!(occurrences, 1);
    }

    #[tokio::test]
    async fn test_catchup_without_subscribers_leaves_tailer_at_end() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        let record = fx.pipeline.track_session(&path).await.unwrap();
        let end = std::fs::metadata(&path).unwrap().len();

        assert_eq!(record.tailer().lock().await.position(), end);
        assert_eq!(fx.pipeline.process_session_messages("s1").await, 0);
    }

    #[tokio::test]
    async fn test_track_session_skips_known_and_empty() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        let empty = fx.append("empty.jsonl", &[]);

        assert!(fx.pipeline.track_session(&path).await.is_some());
        assert!(fx.pipeline.track_session(&path).await.is_none());
        assert!(fx.pipeline.track_session(&empty).await.is_none());
        assert_eq!(fx.pipeline.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_appended_lines_are_published_in_order() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&path).await.unwrap();

        let mut rich = fx.pipeline.hub().subscribe(SubscriberKind::Rich);
        let mut structured = fx.pipeline.hub().subscribe(SubscriberKind::Structured);
        fx.append("s1.jsonl", &[USER_LINE, ASSISTANT_LINE]);

        fx.pipeline.handle_changed_paths(&[path]).await;

        let rich_events = drain(&mut rich);
        assert_eq!(names(&rich_events), ["message", "message", "session_status"]);
        assert!(rich_events[1].payload["content"]
            .as_str()
            .unwrap()
            .contains("All green"));
        assert_eq!(rich_events[2].payload["waiting_for_input"], true);

        let structured_events = drain(&mut structured);
        assert_eq!(
            names(&structured_events),
            ["message", "message", "session_status"]
        );
        assert_eq!(structured_events[0].payload["session_id"], "s1");
        assert_eq!(structured_events[0].payload["message"]["role"], "user");
    }

    #[tokio::test]
    async fn test_no_growth_publishes_nothing() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&path).await.unwrap();
        let mut rich = fx.pipeline.hub().subscribe(SubscriberKind::Rich);

        assert_eq!(fx.pipeline.process_session_messages("s1").await, 0);
        assert_eq!(fx.pipeline.process_session_messages("unknown").await, 0);
        assert!(drain(&mut rich).is_empty());
    }

    #[tokio::test]
    async fn test_summary_change_is_announced() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&path).await.unwrap();
        let mut structured = fx.pipeline.hub().subscribe(SubscriberKind::Structured);

        let summary = fx.path("s1_summary.json");
        std::fs::write(
            &summary,
            r#"{"title":"Test run","short_summary":"Ran tests","executive_summary":"Everything passes"}"#,
        )
        .unwrap();
        fx.pipeline.handle_changed_paths(&[summary]).await;

        let events = drain(&mut structured);
        assert_eq!(names(&events), ["session_summary_updated"]);
        assert_eq!(events[0].payload["session_id"], "s1");
        assert_eq!(events[0].payload["summaryTitle"], "Test run");
        assert_eq!(events[0].payload["summaryExecutive"], "Everything passes");
    }

    #[tokio::test]
    async fn test_deleted_file_removes_session() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&path).await.unwrap();
        let mut rich = fx.pipeline.hub().subscribe(SubscriberKind::Rich);

        std::fs::remove_file(&path).unwrap();
        fx.pipeline.handle_changed_paths(&[path]).await;

        assert!(fx.pipeline.registry().is_empty());
        let events = drain(&mut rich);
        assert_eq!(names(&events), ["session_removed"]);
        assert_eq!(events[0].payload["id"], "s1");
    }

    #[tokio::test]
    async fn test_unknown_file_triggers_discovery() {
        let fx = Fixture::new();
        let first = fx.append("s1.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&first).await.unwrap();
        let mut rich = fx.pipeline.hub().subscribe(SubscriberKind::Rich);

        let second = fx.append("s2.jsonl", &[USER_LINE]);
        fx.pipeline.handle_changed_paths(&[second]).await;

        assert!(fx.pipeline.registry().contains("s2"));
        let events = drain(&mut rich);
        assert_eq!(events[0].name, "session_added");
        assert_eq!(events[0].payload["id"], "s2");
    }

    #[tokio::test]
    async fn test_ignored_paths() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&path).await.unwrap();
        let mut rich = fx.pipeline.hub().subscribe(SubscriberKind::Rich);

        let notes = fx.path("notes.md");
        std::fs::write(&notes, "scratch").unwrap();
        fx.pipeline
            .handle_changed_paths(&[notes, PathBuf::from("/elsewhere/x.jsonl")])
            .await;

        assert!(drain(&mut rich).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_catches_missed_appends_and_deletions() {
        let fx = Fixture::new();
        let kept = fx.append("s1.jsonl", &[USER_LINE]);
        let gone = fx.append("s2.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&kept).await.unwrap();
        fx.pipeline.track_session(&gone).await.unwrap();
        let mut structured = fx.pipeline.hub().subscribe(SubscriberKind::Structured);

        fx.append("s1.jsonl", &[ASSISTANT_LINE]);
        std::fs::remove_file(&gone).unwrap();
        fx.pipeline.sweep().await;

        assert!(fx.pipeline.registry().contains("s1"));
        assert!(!fx.pipeline.registry().contains("s2"));
        let events = drain(&mut structured);
        assert!(names(&events).contains(&"session_removed"));
        assert!(names(&events).contains(&"message"));
    }

    #[tokio::test]
    async fn test_initial_scan_respects_limit() {
        let fx = Fixture::new();
        for n in 0..3 {
            fx.append(&format!("s{n}.jsonl"), &[USER_LINE]);
        }
        let backends = fx.pipeline.registry().backends().clone();
        let limited = LivePipeline::new(
            Arc::new(SessionRegistry::new(backends, 2)),
            Arc::new(BroadcastHub::new()),
            Arc::new(HtmlRenderer::new()),
        );

        assert_eq!(limited.initial_scan().await, 2);
        assert_eq!(limited.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_track_startup_keeps_explicit_session_alongside_scan() {
        let fx = Fixture::new();
        let line = |hour: u32| {
            format!(
                r#"{{"type":"user","timestamp":"2026-01-29T{hour:02}:00:00Z","message":{{"role":"user","content":"hi"}}}}"#
            )
        };
        fx.append("older.jsonl", &[&line(11)]);
        fx.append("newer.jsonl", &[&line(12)]);
        let pinned = fx.append("pinned.jsonl", &[&line(9)]);
        let day_ago = std::time::SystemTime::now() - Duration::from_secs(86_400);
        filetime::set_file_mtime(&pinned, filetime::FileTime::from_system_time(day_ago)).unwrap();

        let backends = fx.pipeline.registry().backends().clone();
        let limited = LivePipeline::new(
            Arc::new(SessionRegistry::new(backends, 2)),
            Arc::new(BroadcastHub::new()),
            Arc::new(HtmlRenderer::new()),
        );

        assert_eq!(limited.track_startup(&[pinned.clone(), pinned]).await, 3);
        let mut ids = limited.registry().ids();
        ids.sort();
        assert_eq!(ids, ["newer", "pinned"]);
    }

    #[tokio::test]
    async fn test_run_processes_events_until_cancelled() {
        let fx = Fixture::new();
        let path = fx.append("s1.jsonl", &[USER_LINE]);
        fx.pipeline.track_session(&path).await.unwrap();
        let mut rich = fx.pipeline.hub().subscribe(SubscriberKind::Rich);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = {
            let pipeline = fx.pipeline.clone().with_sweep_interval(Duration::from_secs(60));
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(rx, cancel).await })
        };

        fx.append("s1.jsonl", &[ASSISTANT_LINE]);
        tx.send(WatchEvent::Changed(vec![path])).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rich.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.name, "message");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
