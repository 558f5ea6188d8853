use breaker_registry::{CircuitBreakerRegistry, CircuitError, CircuitState, Config};
use futures::{StreamExt, stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Counts {
    successes: AtomicUsize,
    errors: AtomicUsize,
}

/// Registry with a long default deadline, a shorter one for "slow" and
/// outcome counters wired into every breaker
fn registry(default_timeout: Duration, slow_timeout: Duration) -> (CircuitBreakerRegistry, Arc<Counts>) {
    let counts = Arc::new(Counts::default());
    let registry = CircuitBreakerRegistry::new();

    registry.configure_default(move |_| Config {
        timeout: default_timeout,
        ..Config::default()
    });
    registry
        .configure(
            move |config| Config {
                timeout: slow_timeout,
                ..config
            },
            &["slow"],
        )
        .expect("nothing built yet");

    let listener_counts = counts.clone();
    registry.add_global_customizer(move |builder| {
        let on_success = listener_counts.clone();
        let on_error = listener_counts.clone();
        builder
            .on_success(move |_, _| {
                on_success.successes.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_, _, _| {
                on_error.errors.fetch_add(1, Ordering::SeqCst);
            })
    });

    (registry, counts)
}

#[test]
fn slow_call_times_out_under_per_name_deadline() {
    let (registry, counts) = registry(Duration::from_millis(400), Duration::from_millis(200));
    let slow = registry.create("slow").expect("valid config");

    let result = slow.run(
        || {
            thread::sleep(Duration::from_millis(300));
            Ok::<_, String>("slow".to_string())
        },
        |err| {
            assert!(err.is_timeout());
            Ok("fallback".to_string())
        },
    );

    assert_eq!(result, Ok("fallback".to_string()));
    assert_eq!(counts.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counts.successes.load(Ordering::SeqCst), 0);
}

#[test]
fn same_call_passes_under_default_deadline() {
    let (registry, counts) = registry(Duration::from_millis(400), Duration::from_millis(200));
    let normal = registry.create("normal").expect("valid config");

    let result = normal.run(
        || {
            thread::sleep(Duration::from_millis(300));
            Ok::<_, String>("normal".to_string())
        },
        |_| Ok("fallback".to_string()),
    );

    assert_eq!(result, Ok("normal".to_string()));
    assert_eq!(counts.errors.load(Ordering::SeqCst), 0);
    assert_eq!(counts.successes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn async_deadlines_follow_registry_config() {
    let (registry, counts) = registry(Duration::from_secs(4), Duration::from_secs(2));
    let slow = registry.create("slow").expect("valid config");
    let normal = registry.create("normal").expect("valid config");

    let three_seconds = |label: &'static str| async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok::<_, String>(label)
    };

    let slow_result = slow
        .run_async(three_seconds("slow"), |_| async { Ok("fallback") })
        .await;
    let normal_result = normal
        .run_async(three_seconds("normal"), |_| async { Ok("fallback") })
        .await;

    assert_eq!(slow_result, Ok("fallback"));
    assert_eq!(normal_result, Ok("normal"));
    assert_eq!(counts.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counts.successes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_stream_switches_to_fallback() {
    let (registry, _counts) = registry(Duration::from_secs(4), Duration::from_secs(2));
    let slow = registry.create("slow").expect("valid config");
    let normal = registry.create("normal").expect("valid config");

    let source = || {
        stream::iter(vec!["first", "second"]).then(|item| async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<_, String>(item)
        })
    };

    let slow_items: Vec<_> = slow
        .run_stream(source(), |_| stream::iter(vec![Ok("fallback")]))
        .collect()
        .await;
    let normal_items: Vec<_> = normal
        .run_stream(source(), |_| stream::iter(vec![Ok("fallback")]))
        .collect()
        .await;

    assert_eq!(slow_items, vec![Ok("fallback")]);
    assert_eq!(normal_items, vec![Ok("first"), Ok("second")]);
}

#[test]
fn open_circuit_stops_executing_operations() {
    let registry = CircuitBreakerRegistry::new();
    registry.configure_default(|_| Config {
        failure_rate_threshold: 50.0,
        minimum_calls: 5,
        sliding_window_size: 10,
        ..Config::default()
    });
    let breaker = registry.create("backend").expect("valid config");

    let executed = Arc::new(AtomicUsize::new(0));
    let mut fallbacks = Vec::new();

    for _ in 0..10 {
        let executed = executed.clone();
        let result = breaker.run(
            move || {
                executed.fetch_add(1, Ordering::SeqCst);
                Err::<&str, _>("Boom".to_string())
            },
            |err| {
                fallbacks.push(err.is_rejected());
                Ok("fallback")
            },
        );
        assert_eq!(result, Ok("fallback"));
    }

    assert_eq!(executed.load(Ordering::SeqCst), 5);
    assert_eq!(fallbacks[..5], [false; 5]);
    assert_eq!(fallbacks[5..], [true; 5]);
    assert_eq!(breaker.state(), CircuitState::Open);

    let metrics = breaker.metrics();
    assert_eq!(metrics.failed_calls, 5);
    assert_eq!(metrics.rejected_calls, 5);
}

#[test]
fn concurrent_first_use_builds_one_breaker() {
    let registry = Arc::new(CircuitBreakerRegistry::new());
    let constructions = Arc::new(AtomicUsize::new(0));

    let counter = constructions.clone();
    registry.add_global_customizer(move |builder| {
        counter.fetch_add(1, Ordering::SeqCst);
        builder
    });

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                registry.create("shared").expect("valid config")
            })
        })
        .collect();

    let breakers: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert!(breakers.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn late_registration_is_rejected_but_global_customizer_is_not() {
    let registry = CircuitBreakerRegistry::new();
    let built = registry.create("built").expect("valid config");

    assert!(registry.add_customizer(|b| b, &["built"]).is_err());

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    registry.add_global_customizer(move |builder| {
        seen_clone.lock().push(builder.name().to_string());
        builder
    });

    let again = registry.create("built").expect("valid config");
    registry.create("later").expect("valid config");

    assert!(Arc::ptr_eq(&built, &again));
    assert_eq!(*seen.lock(), vec!["later".to_string()]);
}

#[test]
fn recovery_through_half_open() {
    let clock = Arc::new(breaker_registry::ManualClock::new());
    let registry = CircuitBreakerRegistry::with_clock(clock.clone());
    let transitions = Arc::new(parking_lot::Mutex::new(Vec::new()));

    registry.configure_default(|_| Config {
        minimum_calls: 2,
        sliding_window_size: 4,
        half_open_permitted_calls: 2,
        open_duration: Duration::from_secs(30),
        ..Config::default()
    });
    let log = transitions.clone();
    registry
        .add_customizer(
            move |builder| {
                let (open, half, close) = (log.clone(), log.clone(), log.clone());
                builder
                    .on_open(move |_| open.lock().push(CircuitState::Open))
                    .on_half_open(move |_| half.lock().push(CircuitState::HalfOpen))
                    .on_close(move |_| close.lock().push(CircuitState::Closed))
            },
            &["payments"],
        )
        .expect("nothing built yet");

    let breaker = registry.create("payments").expect("valid config");
    for _ in 0..2 {
        let _ = breaker.call(|| Err::<(), _>("declined"));
    }
    assert!(matches!(
        breaker.call(|| Ok::<_, &str>(())),
        Err(CircuitError::Open { .. })
    ));

    clock.advance(Duration::from_secs(30));
    for _ in 0..2 {
        breaker.call(|| Ok::<_, &str>(())).expect("probe admitted");
    }

    assert_eq!(
        *transitions.lock(),
        vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]
    );
    assert_eq!(breaker.metrics().buffered_calls, 0);
}
