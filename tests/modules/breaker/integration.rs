//! 熔断器模块集成测试
//!
//! 测试熔断器的状态转换、定时器和停止运行

use crate::common::{create_test_config, init_tracing, TransitionRecorder};
use breakeron::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// 测试请求量下限：999个请求、900个失败时保持关闭
#[tokio::test(start_paused = true)]
async fn test_volume_floor_scenario() {
    init_tracing();
    let config = BreakerConfig::new()
        .request_volume_threshold(1000)
        .error_threshold_percent(20);
    let breaker = CircuitBreaker::new(config).unwrap();
    assert_eq!(breaker.thresholds().error_volume, 200);

    assert_ok!(breaker.report_request(999));
    assert_ok!(breaker.report_error(900));
    assert_eq!(breaker.current_status(), BreakerState::Closed);

    // 第1000个请求失败后达到下限
    assert_ok!(breaker.report_request(1));
    assert_ok!(breaker.report_error(1));
    assert_eq!(breaker.current_status(), BreakerState::Open);

    let result = breaker.report_request(1);
    assert!(matches!(result, Err(BreakerError::TooManyErrors)));
}

/// 测试错误量恰好达到阈值时熔断
#[tokio::test(start_paused = true)]
async fn test_error_threshold_scenario() {
    let config = BreakerConfig::new()
        .request_volume_threshold(1000)
        .error_threshold_percent(20);
    let breaker = CircuitBreaker::new(config).unwrap();

    assert_ok!(breaker.report_request(1000));
    for _ in 0..199 {
        assert_ok!(breaker.report_error(1));
    }
    assert!(breaker.is_closed());

    assert_ok!(breaker.report_error(1));
    assert!(breaker.is_open());
    assert_eq!(breaker.stats().error_volume, 200);
}

/// 测试休眠窗口：15秒内保持打开，之后进入半开
#[tokio::test(start_paused = true)]
async fn test_sleep_window_scenario() {
    let config = BreakerConfig::new()
        .request_volume_threshold(1)
        .sleep_window(Duration::from_secs(15));
    let breaker = CircuitBreaker::new(config).unwrap();

    assert_ok!(breaker.report_request(1));
    assert_ok!(breaker.report_error(1));
    assert!(breaker.is_open());

    tokio::time::sleep(Duration::from_millis(14_900)).await;
    assert_eq!(breaker.current_status(), BreakerState::Open);
    assert_err!(breaker.report_request(1));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(breaker.current_status(), BreakerState::HalfOpen);
    assert_ok!(breaker.report_request(1));
}

/// 测试统计窗口重置不改变状态
#[tokio::test(start_paused = true)]
async fn test_window_reset_keeps_status() {
    let breaker = CircuitBreaker::new(create_test_config()).unwrap();

    for _ in 0..3 {
        assert_ok!(breaker.report_request(9));
        assert_ok!(breaker.report_error(4));
        assert!(breaker.is_closed());

        tokio::time::sleep(Duration::from_millis(60_100)).await;

        let stats = breaker.stats();
        assert_eq!(stats.state, BreakerState::Closed);
        assert_eq!(stats.request_volume, 0);
        assert_eq!(stats.error_volume, 0);
    }
}

/// 测试恢复后统计窗口重新开始计时
#[tokio::test(start_paused = true)]
async fn test_window_reset_restarts_after_close() {
    let breaker = CircuitBreaker::new(create_test_config()).unwrap();

    assert_ok!(breaker.report_request(10));
    assert_ok!(breaker.report_error(5));
    tokio::time::sleep(Duration::from_millis(15_100)).await;
    assert_ok!(breaker.report_request(5));
    assert_ok!(breaker.report_success(5));
    assert!(breaker.is_closed());

    assert_ok!(breaker.report_request(3));

    // 关闭后59秒内计数保留
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(breaker.stats().request_volume, 3);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(breaker.stats().request_volume, 0);
}

/// 测试所有状态变更回调
#[tokio::test(start_paused = true)]
async fn test_transition_callbacks() {
    let recorder = TransitionRecorder::new();
    let breaker = CircuitBreaker::new(recorder.attach(create_test_config())).unwrap();

    // Closed -> Open
    assert_ok!(breaker.report_request(10));
    assert_ok!(breaker.report_error(5));
    recorder.wait_for(1).await;

    // Open -> HalfOpen 不触发回调
    tokio::time::sleep(Duration::from_millis(15_100)).await;
    assert!(breaker.is_half_open());
    assert_eq!(recorder.events().len(), 1);

    // HalfOpen -> Open
    assert_ok!(breaker.report_error(1));
    recorder.wait_for(2).await;

    // HalfOpen -> Closed
    tokio::time::sleep(Duration::from_millis(15_100)).await;
    assert_ok!(breaker.report_request(5));
    assert_ok!(breaker.report_success(5));

    let events = recorder.wait_for(3).await;
    let pairs: Vec<_> = events.iter().map(|t| (t.from, t.to)).collect();
    assert_eq!(
        pairs,
        vec![
            (BreakerState::Closed, BreakerState::Open),
            (BreakerState::HalfOpen, BreakerState::Open),
            (BreakerState::HalfOpen, BreakerState::Closed),
        ]
    );
}

/// 测试丢弃熔断器后定时器不再触发状态变更
#[tokio::test(start_paused = true)]
async fn test_drop_stops_timers() {
    let recorder = TransitionRecorder::new();
    let breaker = CircuitBreaker::new(recorder.attach(create_test_config())).unwrap();

    assert_ok!(breaker.report_request(10));
    assert_ok!(breaker.report_error(5));
    recorder.wait_for(1).await;
    drop(breaker);

    // 未停止的话，休眠窗口和恢复周期到期后会恢复为关闭并触发回调
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(recorder.events().len(), 1);
}

/// 测试半开状态下停止运行不会再恢复
#[tokio::test(start_paused = true)]
async fn test_shutdown_in_half_open() {
    let recorder = TransitionRecorder::new();
    let breaker = CircuitBreaker::new(recorder.attach(create_test_config())).unwrap();

    assert_ok!(breaker.report_request(10));
    assert_ok!(breaker.report_error(5));
    tokio::time::sleep(Duration::from_millis(15_100)).await;
    assert!(breaker.is_half_open());

    breaker.shutdown();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(breaker.is_half_open());
    assert_eq!(recorder.count_to(BreakerState::Closed), 0);
    assert!(matches!(
        breaker.report_success(5),
        Err(BreakerError::ShutDown)
    ));
}

/// 测试在非运行时线程上报也能驱动定时器
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reports_from_plain_threads() {
    let config = create_test_config().sleep_window(Duration::from_millis(100));
    let breaker = Arc::new(CircuitBreaker::new(config).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let breaker = breaker.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    let _ = breaker.report_request(1);
                    let _ = breaker.report_error(1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(breaker.is_open());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(breaker.is_half_open());
}

/// 测试与停止运行并发的上报要么正常完成，要么返回停止错误
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reports_concurrent_with_shutdown() {
    let config = BreakerConfig::new().request_volume_threshold(u64::MAX / 200);
    let breaker = Arc::new(CircuitBreaker::new(config).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                loop {
                    match breaker.report_request(1) {
                        Ok(()) => tokio::task::yield_now().await,
                        Err(BreakerError::ShutDown) => break,
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    breaker.shutdown();

    for handle in handles {
        handle.await.unwrap();
    }
    assert!(breaker.is_shut_down());
    assert!(matches!(
        breaker.report_error(1),
        Err(BreakerError::ShutDown)
    ));
}
