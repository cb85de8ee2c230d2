//! Event dispatcher integration tests
//!
//! Tests for listener fan-out:
//! - Registration order and callback routing
//! - Unsubscribe and dispose
//! - Flush and the dispatch thread

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use relay_core::{
    DiffEvent, DoneEvent, ErrorEvent, Event, EventDispatcher, EventListener, FileChange,
    TokenEvent, ToolCallEvent, ToolResultEvent, UnknownEvent, DISPATCH_THREAD_NAME,
};
use serde_json::Map;

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: &'static str,
    log: Log,
}

impl Recorder {
    fn new(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
        })
    }

    fn record(&self, what: impl std::fmt::Display) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, what));
    }
}

impl EventListener for Recorder {
    fn on_token(&self, event: &TokenEvent) {
        self.record(format!("token {}", event.text));
    }

    fn on_tool_call(&self, event: &ToolCallEvent) {
        self.record(format!("tool_call {}", event.tool));
    }

    fn on_tool_result(&self, event: &ToolResultEvent) {
        self.record(format!("tool_result {}", event.tool));
    }

    fn on_diff(&self, event: &DiffEvent) {
        self.record(format!("diff {}", event.files.len()));
    }

    fn on_error(&self, event: &ErrorEvent) {
        self.record(format!("error {}", event.message));
    }

    fn on_done(&self, _event: &DoneEvent) {
        self.record("done");
    }

    fn on_unknown(&self, event: &UnknownEvent) {
        self.record(format!("unknown {}", event.event_type));
    }
}

fn token(text: &str) -> Event {
    Event::Token(TokenEvent {
        session_id: "s1".into(),
        text: text.into(),
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

mod ordering_tests {
    use super::*;

    #[tokio::test]
    async fn test_registration_order_per_event() {
        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        dispatcher.subscribe(Recorder::new("a", &log));
        dispatcher.subscribe(Recorder::new("b", &log));

        dispatcher.publish(token("1"));
        dispatcher.publish(token("2"));
        dispatcher.flush().await;

        assert_eq!(
            entries(&log),
            vec!["a:token 1", "b:token 1", "a:token 2", "b:token 2"]
        );
    }

    #[tokio::test]
    async fn test_every_variant_routed() {
        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        dispatcher.subscribe(Recorder::new("l", &log));

        dispatcher.publish(token("t"));
        dispatcher.publish(Event::ToolCall(ToolCallEvent {
            session_id: "s1".into(),
            tool: "read_file".into(),
            input: Map::new(),
        }));
        dispatcher.publish(Event::ToolResult(ToolResultEvent {
            session_id: "s1".into(),
            tool: "read_file".into(),
            output: Map::new(),
        }));
        dispatcher.publish(Event::Diff(DiffEvent {
            session_id: "s1".into(),
            files: vec![FileChange {
                path: "a.txt".into(),
                before: String::new(),
                after: "x".into(),
            }],
        }));
        dispatcher.publish(Event::Unknown(UnknownEvent {
            session_id: "s1".into(),
            event_type: "thinking".into(),
            raw: "{}".into(),
        }));
        dispatcher.publish(Event::error("s1", "boom"));
        dispatcher.publish(Event::done("s1"));
        dispatcher.flush().await;

        assert_eq!(
            entries(&log),
            vec![
                "l:token t",
                "l:tool_call read_file",
                "l:tool_result read_file",
                "l:diff 1",
                "l:unknown thinking",
                "l:error boom",
                "l:done",
            ]
        );
    }

    #[tokio::test]
    async fn test_default_callbacks_ignore_events() {
        struct TokensOnly(Log);

        impl EventListener for TokensOnly {
            fn on_token(&self, event: &TokenEvent) {
                self.0.lock().unwrap().push(event.text.clone());
            }
        }

        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        dispatcher.subscribe(Arc::new(TokensOnly(Arc::clone(&log))));

        dispatcher.publish(Event::done("s1"));
        dispatcher.publish(token("kept"));
        dispatcher.publish(Event::error("s1", "ignored"));
        dispatcher.flush().await;

        assert_eq!(entries(&log), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_callbacks_run_on_dispatch_thread() {
        struct ThreadProbe(mpsc::Sender<Option<String>>);

        impl EventListener for ThreadProbe {
            fn on_token(&self, _event: &TokenEvent) {
                let name = thread::current().name().map(str::to_string);
                let _ = self.0.send(name);
            }
        }

        let dispatcher = EventDispatcher::new().unwrap();
        let (tx, rx) = mpsc::channel();
        dispatcher.subscribe(Arc::new(ThreadProbe(tx)));

        dispatcher.publish(token("x"));
        dispatcher.flush().await;

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(DISPATCH_THREAD_NAME));
    }

    #[tokio::test]
    async fn test_publish_from_many_threads() {
        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        dispatcher.subscribe(Recorder::new("l", &log));

        let publishers: Vec<_> = (0..4)
            .map(|n| {
                let dispatcher = dispatcher.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        dispatcher.publish(token(&format!("{}-{}", n, i)));
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.join().unwrap();
        }
        dispatcher.flush().await;

        let seen = entries(&log);
        assert_eq!(seen.len(), 100);
        // Per-publisher order is preserved
        for n in 0..4 {
            let prefix = format!("l:token {}-", n);
            let order: Vec<u32> = seen
                .iter()
                .filter_map(|entry| entry.strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(order, (0..25).collect::<Vec<_>>());
        }
    }
}

mod subscription_tests {
    use super::*;

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        let a = dispatcher.subscribe(Recorder::new("a", &log));
        dispatcher.subscribe(Recorder::new("b", &log));

        dispatcher.publish(token("1"));
        dispatcher.flush().await;
        assert!(dispatcher.unsubscribe(a));
        assert!(!dispatcher.unsubscribe(a));
        dispatcher.publish(token("2"));
        dispatcher.flush().await;

        assert_eq!(entries(&log), vec!["a:token 1", "b:token 1", "b:token 2"]);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_during_delivery_applies_to_next_event() {
        struct Subscriber {
            dispatcher: EventDispatcher,
            log: Log,
            late: Mutex<Option<Arc<Recorder>>>,
        }

        impl EventListener for Subscriber {
            fn on_token(&self, event: &TokenEvent) {
                self.log.lock().unwrap().push(format!("first:token {}", event.text));
                if let Some(late) = self.late.lock().unwrap().take() {
                    self.dispatcher.subscribe(late);
                }
            }
        }

        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        dispatcher.subscribe(Arc::new(Subscriber {
            dispatcher: dispatcher.clone(),
            log: Arc::clone(&log),
            late: Mutex::new(Some(Recorder::new("late", &log))),
        }));

        dispatcher.publish(token("1"));
        dispatcher.flush().await;
        dispatcher.publish(token("2"));
        dispatcher.flush().await;

        assert_eq!(
            entries(&log),
            vec!["first:token 1", "first:token 2", "late:token 2"]
        );

        // The subscriber holds a clone of the dispatcher
        dispatcher.dispose();
    }
}

mod lifecycle_tests {
    use super::*;

    /// Blocks the dispatch thread on its first event until released
    struct Gate {
        log: Log,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl EventListener for Gate {
        fn on_token(&self, event: &TokenEvent) {
            self.log.lock().unwrap().push(event.text.clone());
            if let Some(release) = self.release.lock().unwrap().take() {
                let _ = release.recv_timeout(Duration::from_secs(5));
            }
        }
    }

    #[tokio::test]
    async fn test_dispose_drops_pending_events() {
        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        let (release, gate) = mpsc::channel();
        dispatcher.subscribe(Arc::new(Gate {
            log: Arc::clone(&log),
            release: Mutex::new(Some(gate)),
        }));

        dispatcher.publish(token("first"));
        while entries(&log).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        dispatcher.publish(token("queued"));
        dispatcher.dispose();
        release.send(()).unwrap();

        dispatcher.publish(token("after"));
        dispatcher.flush().await;

        assert_eq!(entries(&log), vec!["first"]);
        assert!(dispatcher.is_disposed());
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_waits_for_slow_listener() {
        struct Slow(Log);

        impl EventListener for Slow {
            fn on_token(&self, event: &TokenEvent) {
                thread::sleep(Duration::from_millis(20));
                self.0.lock().unwrap().push(event.text.clone());
            }
        }

        let dispatcher = EventDispatcher::new().unwrap();
        let log = Log::default();
        dispatcher.subscribe(Arc::new(Slow(Arc::clone(&log))));

        for text in ["a", "b", "c"] {
            dispatcher.publish(token(text));
        }
        assert!(entries(&log).len() < 3);

        dispatcher.flush().await;
        assert_eq!(entries(&log), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_publish_never_runs_on_caller_thread() {
        struct Caller(mpsc::Sender<thread::ThreadId>);

        impl EventListener for Caller {
            fn on_token(&self, _event: &TokenEvent) {
                let _ = self.0.send(thread::current().id());
            }
        }

        let dispatcher = EventDispatcher::new().unwrap();
        let (tx, rx) = mpsc::channel();
        dispatcher.subscribe(Arc::new(Caller(tx)));

        dispatcher.publish(token("x"));
        dispatcher.flush().await;

        let callback_thread = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(callback_thread, thread::current().id());
    }
}
