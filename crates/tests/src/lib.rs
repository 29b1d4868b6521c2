//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（无需真实传感器）
//! - 配置到运行时的贯通验证

#[cfg(test)]
mod contract_tests {
    use contracts::{CalibrationBaseline, Event, EventCategory, MAX_SCORE};
    use dispatcher::StatusSnapshot;

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_baseline_event_category() {
        let event: Event = CalibrationBaseline::new(500.0, 500.0, 1.0).into();
        assert_eq!(event.category(), EventCategory::Calibration);
    }

    #[test]
    fn test_fresh_snapshot_waits_for_calibration() {
        let snapshot = StatusSnapshot::default();
        assert_eq!(snapshot.score, MAX_SCORE);
        assert!(!snapshot.calibration_complete);
        assert!(!snapshot.finished);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        CalibrationBaseline, Event, EventCategory, EventPayload, FrameSample, PostureStatus,
        PressureSample, SampleOrigin, SensorsConfig, SinkConfig, SinkType, SourceMode,
        SystemNotice, MAX_SCORE,
    };
    use dispatcher::{create_dispatcher, handler_fn, EventBus, StatusSnapshot};
    use evaluator::{
        run_calibration, CalibrationCapture, EvaluatorConfig, EvaluatorPhase, EvaluatorService,
        FixedInterval, IntervalSchedule, LatestReadings, RandomInterval,
    };
    use ingestion::IngestionPipeline;

    fn snapshot_sink(path: &Path) -> SinkConfig {
        SinkConfig {
            name: "snapshot".to_string(),
            sink_type: SinkType::Snapshot,
            queue_capacity: 64,
            params: HashMap::from([("path".to_string(), path.display().to_string())]),
        }
    }

    fn collect(bus: &EventBus, category: EventCategory) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = bus.subscribe(
            category,
            handler_fn("e2e_collector", move |event| {
                sink.lock().unwrap().push(event);
                async { Ok(()) }
            }),
        );
        seen
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn read_snapshot(path: &Path) -> Option<StatusSnapshot> {
        StatusSnapshot::read_from(path).ok()
    }

    fn feed(bus: &EventBus, foot: i64, cushion: i64) {
        bus.publish(FrameSample::new(1, Some(0.05), Some(0.05))).unwrap();
        bus.publish(PressureSample::new(foot, cushion, SampleOrigin::Simulated))
            .unwrap();
    }

    /// End-to-end test: Calibration -> Evaluator -> Bus -> SnapshotSink
    ///
    /// 验证完整的数据流：
    /// 1. 校准基线经总线到达评估器
    /// 2. 异常坐姿触发扣分并发布结果
    /// 3. Dispatcher 将结果写入状态快照文件
    #[tokio::test]
    async fn test_e2e_bad_posture_reaches_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let bus = EventBus::new();
        let dispatcher = create_dispatcher(vec![snapshot_sink(&path)], &bus).unwrap();
        let service = EvaluatorService::spawn(
            &bus,
            EvaluatorConfig {
                eye_threshold: 0.1,
                pressure_threshold: 200.0,
                cooldown: Duration::from_secs(60),
            },
            FixedInterval::new(Duration::from_millis(10)).unwrap(),
        );
        bus.start().await.unwrap();

        bus.publish(CalibrationBaseline::new(500.0, 500.0, 1.0)).unwrap();
        wait_until(|| service.phase() == EvaluatorPhase::Armed).await;
        wait_until(|| read_snapshot(&path).is_some_and(|s| s.calibration_complete)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        feed(&bus, 800, 500);
        wait_until(|| read_snapshot(&path).is_some_and(|s| s.status == PostureStatus::BadFoot))
            .await;

        let snapshot = read_snapshot(&path).unwrap();
        assert_eq!(snapshot.score, MAX_SCORE - 1);
        assert!(snapshot.calibration_complete);
        assert!(snapshot.details.contains_key("foot_deviation"));

        // Inside the cooldown: a second bad check is reported but not penalized
        tokio::time::sleep(Duration::from_millis(20)).await;
        feed(&bus, 800, 500);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.score(), MAX_SCORE - 1);

        service.shutdown().await;
        assert!(bus.wait_idle(Duration::from_secs(1)).await);
        bus.stop().await;
        dispatcher.shutdown().await;
    }

    /// 连续扣分至 0，终止通知只发布一次，快照标记结束
    #[tokio::test]
    async fn test_e2e_session_runs_to_finished() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let bus = EventBus::new();
        let notices = collect(&bus, EventCategory::System);
        let dispatcher = create_dispatcher(vec![snapshot_sink(&path)], &bus).unwrap();
        let service = EvaluatorService::spawn(
            &bus,
            EvaluatorConfig {
                eye_threshold: 0.1,
                pressure_threshold: 200.0,
                cooldown: Duration::ZERO,
            },
            FixedInterval::new(Duration::from_millis(2)).unwrap(),
        );
        bus.start().await.unwrap();
        bus.publish(CalibrationBaseline::new(500.0, 500.0, 1.0)).unwrap();
        wait_until(|| service.phase() == EvaluatorPhase::Armed).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while service.phase() != EvaluatorPhase::Finished {
                tokio::time::sleep(Duration::from_millis(5)).await;
                feed(&bus, 500, 900);
            }
        })
        .await
        .unwrap();
        // Further bad readings after the end change nothing
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            feed(&bus, 500, 900);
        }
        wait_until(|| read_snapshot(&path).is_some_and(|s| s.finished)).await;

        let finished = notices
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                matches!(
                    e.payload(),
                    EventPayload::System(SystemNotice::SessionFinished { score: 0, .. })
                )
            })
            .count();
        assert_eq!(finished, 1);
        assert_eq!(service.score(), 0);
        assert_eq!(read_snapshot(&path).unwrap().score, 0);

        service.shutdown().await;
        bus.stop().await;
        dispatcher.shutdown().await;
    }

    /// 无设备的硬件模式：生产者回退到模拟数据，校准仍能完成
    #[tokio::test]
    async fn test_e2e_calibration_from_fallback_sources() {
        let mut sensors = SensorsConfig::default();
        sensors.optical.mode = SourceMode::Hardware;
        sensors.optical.rate_hz = 200.0;
        sensors.optical.fallback_after = 2;
        sensors.pressure.mode = SourceMode::Hardware;
        sensors.pressure.serial_port = None;
        sensors.pressure.rate_hz = 200.0;
        sensors.pressure.fallback_after = 2;

        let bus = EventBus::new();
        let notices = collect(&bus, EventCategory::System);
        let readings = LatestReadings::new();
        let _reading_subs = readings.attach(&bus);
        let service = EvaluatorService::spawn(
            &bus,
            EvaluatorConfig::default(),
            FixedInterval::new(Duration::from_secs(60)).unwrap(),
        );
        let mut pipeline = IngestionPipeline::from_config(&bus, &sensors).unwrap();
        bus.start().await.unwrap();
        pipeline.start().unwrap();

        wait_until(|| pipeline.metrics().iter().all(|(_, m)| m.fell_back)).await;

        let capture = CalibrationCapture::new(5, Duration::from_millis(10));
        let baseline = run_calibration(&bus, readings.as_ref(), &capture).await.unwrap();
        assert!(baseline.completed);
        assert!(baseline.invalid_channels().is_empty());
        let foot = baseline.baseline_foot.unwrap();
        assert!((300.0..=700.0).contains(&foot), "foot baseline {foot}");

        wait_until(|| service.phase() == EvaluatorPhase::Armed).await;

        pipeline.stop().await;
        service.shutdown().await;
        bus.stop().await;

        let degraded = notices
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e.payload(), EventPayload::System(SystemNotice::SourceDegraded { .. })))
            .count();
        assert_eq!(degraded, 2);
    }

    /// 配置文件贯通到评估器参数与随机间隔
    #[test]
    fn test_e2e_config_drives_evaluator() {
        let toml = r#"
            app_name = "desk-3"

            [processing]
            eye_distance_threshold = 0.2
            pressure_threshold = 150.0
            check_interval_min_s = 1.0
            check_interval_max_s = 2.0
            cooldown_s = 0.5
            interval_seed = 99
        "#;
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.app_name, "desk-3");

        let evaluator_config = EvaluatorConfig::from(&config.processing);
        assert_eq!(evaluator_config.eye_threshold, 0.2);
        assert_eq!(evaluator_config.pressure_threshold, 150.0);
        assert_eq!(evaluator_config.cooldown, Duration::from_millis(500));

        let mut a = RandomInterval::from_config(&config.processing).unwrap();
        let mut b = RandomInterval::from_config(&config.processing).unwrap();
        for _ in 0..20 {
            let next = a.next_interval();
            assert_eq!(next, b.next_interval());
            assert!(next >= Duration::from_secs(1) && next <= Duration::from_secs(2));
        }
    }
}
