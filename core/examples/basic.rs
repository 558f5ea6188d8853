//! Registry-driven circuit breaker usage example

use breaker_registry::{CircuitBreakerRegistry, Config};
use std::thread;
use std::time::Duration;

fn main() {
    println!("=== Circuit Breaker Registry Example ===\n");

    let registry = CircuitBreakerRegistry::new();
    registry.configure_default(|_| Config {
        minimum_calls: 3,
        sliding_window_size: 10,
        timeout: Duration::from_millis(400),
        ..Config::default()
    });
    registry
        .configure(
            |config| Config {
                timeout: Duration::from_millis(100),
                ..config
            },
            &["payment_api"],
        )
        .expect("payment_api is not built yet");
    registry.add_global_customizer(|builder| {
        builder
            .on_open(|name| println!("🔴 Circuit '{name}' opened!"))
            .on_close(|name| println!("🟢 Circuit '{name}' closed!"))
            .on_half_open(|name| println!("🟡 Circuit '{name}' half-open, testing..."))
    });

    let circuit = registry.create("payment_api").expect("valid config");
    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(format!("Payment {i}"))) {
            Ok(result) => println!("✓ {result}"),
            Err(e) => println!("✗ Error: {e}"),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Slow calls past the deadline ---");
    for i in 1..=3 {
        let result = circuit.run(
            move || {
                thread::sleep(Duration::from_millis(200));
                Ok::<_, String>(format!("Payment {i}"))
            },
            |err| Ok(format!("queued for retry ({err})")),
        );
        println!("→ {}", result.unwrap_or_else(|e| e));
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Attempting call while open ---");
    match circuit.call(|| Ok::<_, String>("Should be rejected")) {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {e}"),
    }
    println!("{:?}\n", circuit.metrics());

    println!("--- Resetting circuit ---");
    circuit.reset();
    println!("State after reset: {}", circuit.state_name());
}
