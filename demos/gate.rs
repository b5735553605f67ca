//! Simulated requests passing through the gate, with logging enabled.
//!
//! Run with: `RUST_LOG=warden=debug cargo run --example gate`

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use warden::gate::{self, Rejection};
use warden::{Clock, ManualClock, Settings};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut values = HashMap::new();
    values.insert("JWT_SECRET".to_string(), "demo-secret".to_string());
    values.insert("TOKEN_DURATION_SECS".to_string(), "60".to_string());
    let settings = Settings::from_source(&values).unwrap();
    println!("{:#?}\n", settings);

    // Simulated time so the demo runs instantly
    let clock = ManualClock::starting_now();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let limiters = settings.limiters(shared.clone()).unwrap();
    let service = settings.token_service(shared).unwrap();
    let _sweepers = limiters.start_sweepers().unwrap();

    let client = "203.0.113.50";

    println!("--- Login burst ---");
    let mut token = None;
    for attempt in 1..=7 {
        match gate::check_rate_limit(&limiters.auth, client) {
            Ok(headers) => {
                token = service.issue_standard(1001, "writer@example.com").ok();
                println!("login {}: 200 {:?}", attempt, headers);
            }
            Err(rejection) => report(attempt, &rejection, clock.now_ms()),
        }
    }

    let Some(token) = token else {
        return;
    };

    println!("\n--- Authenticated requests ---");
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
        headers.insert(AUTHORIZATION, value);
    }

    for (label, request) in [("with token", &headers), ("no header", &HeaderMap::new())] {
        match gate::require_auth(&service, request) {
            Ok(claims) => println!("{}: 200 subject {}", label, claims.subject_id),
            Err(rejection) => println!(
                "{}: {} {}",
                label,
                rejection.status(),
                rejection.public_message()
            ),
        }
    }

    println!("\n--- One minute later ---");
    clock.advance(Duration::from_secs(61));
    match gate::require_auth(&service, &headers) {
        Ok(claims) => println!("still valid for subject {}", claims.subject_id),
        Err(rejection) => println!("{} {}", rejection.status(), rejection.public_message()),
    }
    println!(
        "login after waiting: {}",
        if gate::check_rate_limit(&limiters.auth, client).is_ok() { "200" } else { "429" }
    );
}

fn report(attempt: usize, rejection: &Rejection, now_ms: u64) {
    println!(
        "login {}: {} {} {:?}",
        attempt,
        rejection.status(),
        rejection.public_message(),
        rejection.headers(now_ms)
    );
}
