//! Basic usage example for the warden crate.

use std::thread;
use std::time::Duration;
use warden::{Limiters, RateLimitPolicy, RateLimiter, TokenError, TokenService};

fn main() {
    println!("=== Basic Warden Example ===\n");

    // Example 1: Burst then refill
    burst_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Independent default and auth policies
    policies_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Token lifecycle
    token_example();
}

fn burst_example() {
    println!("1. Burst and Refill:");

    let limiter = RateLimiter::new("demo", RateLimitPolicy::new(3, 1.0)).unwrap();
    println!("   Created limiter with capacity 3, refilling 1 token/second");

    for i in 1..=4 {
        let decision = limiter.check("192.0.2.10");
        if decision.allowed {
            println!("   Request {} - ✅ Allowed ({} left)", i, decision.remaining);
        } else {
            println!(
                "   Request {} - ❌ Rate limited (retry in {:?})",
                i, decision.reset_after
            );
        }
    }

    println!("   Waiting 1 second...");
    thread::sleep(Duration::from_secs(1));

    let decision = limiter.check("192.0.2.10");
    println!(
        "   Request 5 - {}",
        if decision.allowed { "✅ Allowed" } else { "❌ Rate limited" }
    );
}

fn policies_example() {
    println!("2. Default and Auth Policies:");

    let limiters = Limiters::standard().unwrap();
    let client = "198.51.100.4";

    let mut logins = 0;
    while limiters.auth.check(client).allowed {
        logins += 1;
    }
    println!("   Login attempts admitted before throttling: {}", logins);

    let decision = limiters.default.check(client);
    println!(
        "   General request afterwards: {} ({} of {} left)",
        if decision.allowed { "✅ Allowed" } else { "❌ Rate limited" },
        decision.remaining,
        decision.capacity
    );

    println!("\n{}", limiters.auth.stats());
}

fn token_example() {
    println!("3. Token Lifecycle:");

    let service = TokenService::new("demo-secret").unwrap();

    let token = service
        .issue(42, "a@b.com", Duration::from_secs(24 * 3600))
        .unwrap();
    println!("   Issued token ({} bytes)", token.len());

    match service.validate(&token) {
        Ok(claims) => println!(
            "   Valid: subject {} <{}>, lifetime {:?}",
            claims.subject_id,
            claims.subject_label,
            claims.lifetime()
        ),
        Err(err) => println!("   Rejected: {}", err),
    }

    let refreshed = service.refresh(&token).unwrap();
    println!("   Refreshed ({} bytes)", refreshed.len());

    let short = service.issue(42, "a@b.com", Duration::from_millis(1)).unwrap();
    thread::sleep(Duration::from_millis(5));
    let err: TokenError = service.validate(&short).unwrap_err();
    println!(
        "   Short-lived token: internal kind '{}', shown to user as '{}'",
        err.kind(),
        err.public_message()
    );

    let other = TokenService::new("another-secret").unwrap();
    if let Err(err) = other.validate(&token) {
        println!("   Under another key: internal kind '{}'", err.kind());
    }
}
