//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到 handler 树的契约测试
//! - UDP 回环 e2e 测试 (sender -> pump -> router -> sink)
//! - pre-handle lock 并发压力测试

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::{HandlerNode, Router};

    const BLUEPRINT: &str = r#"
[[channels]]
name = "main"
[channels.root]
type = "parallel"
name = "fanout"

[[channels.root.children]]
type = "leaf"
name = "console"
kind = "log"
minimal_filter = "warning"

[[channels.root.children]]
type = "leaf"
name = "verbose-console"
kind = "log"
minimal_filter = "debug"
"#;

    #[tokio::test]
    async fn test_blueprint_builds_router() {
        let blueprint = ConfigLoader::load_from_str(BLUEPRINT, ConfigFormat::Toml).unwrap();
        let router = Router::with_channels(&blueprint.channels).await.unwrap();

        let channel = router.channel("main").await.unwrap();
        assert!(matches!(channel.root(), HandlerNode::Parallel { .. }));
        // Least restrictive contribution wins
        assert_eq!(
            channel.options().minimal_filter(),
            Some(contracts::LogLevel::Debug)
        );

        router.shutdown().await;
        assert!(channel.is_retired());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{CriticalError, LogEvent, LogLevel};
    use dispatcher::Router;
    use tokio::sync::mpsc;
    use transport::{
        CallbackError, CriticalErrorCodec, CriticalErrorSender, DiagnosticSink, LogEventCodec,
        LogSender, PumpConfig, PumpState, ReceivePump, SenderConfig, TransportFault,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn loopback() -> PumpConfig {
        PumpConfig::new("127.0.0.1:0".parse().unwrap())
    }

    /// Diagnostic sink that keeps every fault
    #[derive(Default)]
    struct CollectingDiagnostics {
        faults: Mutex<Vec<TransportFault>>,
    }

    impl CollectingDiagnostics {
        fn callback_failures(&self) -> usize {
            self.faults
                .lock()
                .unwrap()
                .iter()
                .filter(|f| matches!(f, TransportFault::Callback { .. }))
                .count()
        }
    }

    impl DiagnosticSink for CollectingDiagnostics {
        fn report(&self, fault: TransportFault) {
            self.faults.lock().unwrap().push(fault);
        }
    }

    /// End-to-end test: LogSender -> ReceivePump -> Router -> FileSink
    ///
    /// 验证完整的数据流：
    /// 1. 发送端把记录拆成多个分片
    /// 2. 接收端重组并回调
    /// 3. Router 将事件分发到 channel 的 handler 树
    #[tokio::test]
    async fn test_e2e_udp_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.jsonl");
        let config = format!(
            r#"
[[channels]]
name = "main"
[channels.root]
type = "sequence"
name = "root"

[[channels.root.children]]
type = "leaf"
name = "console"
kind = "log"

[[channels.root.children]]
type = "leaf"
name = "disk"
kind = "file"
minimal_filter = "info"
params = {{ path = "{}" }}
"#,
            path.display()
        );
        let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml).unwrap();
        let router = Arc::new(Router::with_channels(&blueprint.channels).await.unwrap());

        let mut pump = ReceivePump::bind(loopback(), LogEventCodec::default())
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let router = Arc::clone(&router);
            pump.start_async(move |event: LogEvent| {
                let router = Arc::clone(&router);
                let tx = tx.clone();
                async move {
                    router.dispatch("main", &event).await?;
                    tx.send(event).map_err(|_| "test finished")?;
                    Ok::<(), CallbackError>(())
                }
            })
            .unwrap();
        }

        // Small datagrams force every record through the splitter
        let mut sender_config = SenderConfig::new(pump.local_addr());
        sender_config.max_datagram_size = 64;
        let sender = LogSender::bind("e2e", sender_config, LogEventCodec::default())
            .await
            .unwrap();

        let long_message = "x".repeat(500);
        let events = vec![
            LogEvent::new("billing", LogLevel::Debug, "too verbose for disk"),
            LogEvent::new("billing", LogLevel::Info, long_message.clone()),
            LogEvent::new("search", LogLevel::Error, "index corrupted"),
        ];
        for event in &events {
            assert!(sender.send_event(event).await.unwrap() >= 1);
        }

        let mut received = Vec::new();
        for _ in 0..events.len() {
            let event = tokio::time::timeout(WAIT, rx.recv())
                .await
                .expect("record not received in time")
                .unwrap();
            received.push(event);
        }
        for event in &events {
            assert!(received.contains(event));
        }

        pump.stop().unwrap();
        pump.dispose().await;
        assert_eq!(pump.state(), PumpState::Closed);
        router.shutdown().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2, "debug record must be filtered: {content}");
        assert!(content.contains(&long_message));
        assert!(content.contains("index corrupted"));
    }

    /// Callback fails on the first record: the next one is still processed and the
    /// failure is reported exactly once
    #[tokio::test]
    async fn test_callback_failure_reported_once() {
        let diagnostics = Arc::new(CollectingDiagnostics::default());
        let mut pump = ReceivePump::bind(loopback(), LogEventCodec::default())
            .await
            .unwrap()
            .with_diagnostics(diagnostics.clone());

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let calls = Arc::clone(&calls);
            pump.start(move |event: LogEvent| -> Result<(), CallbackError> {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err("first record rejected".into());
                }
                tx.send(event).map_err(|_| "test finished")?;
                Ok(())
            })
            .unwrap();
        }

        let sender = LogSender::bind(
            "e2e",
            SenderConfig::new(pump.local_addr()),
            LogEventCodec::default(),
        )
        .await
        .unwrap();
        sender
            .send_event(&LogEvent::new("m", LogLevel::Info, "first"))
            .await
            .unwrap();
        // Let the first record reach the consumer before the second is sent
        tokio::time::sleep(Duration::from_millis(50)).await;
        sender
            .send_event(&LogEvent::new("m", LogLevel::Info, "second"))
            .await
            .unwrap();

        let processed = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("second record not processed")
            .unwrap();
        assert_eq!(processed.payload_text(), Some("second"));

        pump.stop().unwrap();
        pump.dispose().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(diagnostics.callback_failures(), 1);
    }

    #[tokio::test]
    async fn test_critical_error_channel() {
        let mut pump = ReceivePump::bind(loopback(), CriticalErrorCodec::default())
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<CriticalError>();
        pump.start(move |critical| {
            tx.send(critical).map_err(|_| "test finished")?;
            Ok(())
        })
        .unwrap();

        let sender = CriticalErrorSender::bind(
            "critical",
            SenderConfig::new(pump.local_addr()),
            CriticalErrorCodec::default(),
        )
        .await
        .unwrap();
        sender
            .report(Some("billing".into()), "file handler cannot open log file")
            .await
            .unwrap();

        let critical = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("critical error not received")
            .unwrap();
        assert_eq!(critical.monitor_id.as_deref(), Some("billing"));
        assert_eq!(critical.message, "file handler cannot open log file");

        pump.stop().unwrap();
        pump.dispose().await;
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use contracts::{
        ChannelConfig, ContractError, Handler, HandlerConfig, LeafConfig, LogEvent, LogLevel,
    };
    use dispatcher::{HandlerRegistry, Router};

    #[derive(Debug, Default)]
    struct Tracking {
        created: AtomicUsize,
        closed: AtomicUsize,
        handled: AtomicUsize,
        violations: AtomicUsize,
    }

    /// Handler that flags any `handle` after `close` and any `close` during `handle`
    struct TrackingHandler {
        name: String,
        tracking: Arc<Tracking>,
        active: AtomicUsize,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Handler for TrackingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &LogEvent, _parallel: bool) -> Result<(), ContractError> {
            if self.closed.load(Ordering::SeqCst) {
                self.tracking.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.active.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.tracking.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), ContractError> {
            if self.active.load(Ordering::SeqCst) > 0 {
                self.tracking.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.closed.store(true, Ordering::SeqCst);
            self.tracking.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tracking_router(tracking: &Arc<Tracking>) -> Router {
        let mut registry = HandlerRegistry::new();
        let tracking = Arc::clone(tracking);
        registry.register("tracking", move |config| {
            tracking.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TrackingHandler {
                name: config.name.clone(),
                tracking: Arc::clone(&tracking),
                active: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }))
        });
        Router::new(registry)
    }

    fn generation(index: usize) -> Vec<ChannelConfig> {
        vec![ChannelConfig {
            name: "main".to_string(),
            root: HandlerConfig::Parallel {
                name: format!("gen-{index}"),
                children: vec![
                    HandlerConfig::Leaf(LeafConfig::new(format!("a-{index}"), "tracking")),
                    HandlerConfig::Leaf(LeafConfig::new(format!("b-{index}"), "tracking")),
                ],
            },
        }]
    }

    /// Concurrent dispatch and reconfiguration: no handler is ever closed while a
    /// dispatch that reached it is still running
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pre_handle_lock_under_reconfiguration() {
        const PRODUCERS: usize = 8;
        const EVENTS_PER_PRODUCER: usize = 300;
        const GENERATIONS: usize = 25;

        let tracking = Arc::new(Tracking::default());
        let router = Arc::new(tracking_router(&tracking));
        router.apply(&generation(0)).await.unwrap();

        let mut producers = Vec::new();
        for producer in 0..PRODUCERS {
            let router = Arc::clone(&router);
            producers.push(tokio::spawn(async move {
                let event = LogEvent::new(format!("producer-{producer}"), LogLevel::Info, "x");
                for _ in 0..EVENTS_PER_PRODUCER {
                    router.dispatch("main", &event).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        let reconfigure = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                for index in 1..=GENERATIONS {
                    router.apply(&generation(index)).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        for producer in producers {
            producer.await.unwrap();
        }
        reconfigure.await.unwrap();
        router.shutdown().await;

        assert_eq!(tracking.violations.load(Ordering::SeqCst), 0);
        assert_eq!(
            tracking.handled.load(Ordering::SeqCst),
            PRODUCERS * EVENTS_PER_PRODUCER * 2
        );
        assert_eq!(tracking.created.load(Ordering::SeqCst), (GENERATIONS + 1) * 2);
        assert_eq!(
            tracking.closed.load(Ordering::SeqCst),
            tracking.created.load(Ordering::SeqCst)
        );
    }
}
