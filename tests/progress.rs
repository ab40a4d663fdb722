//! Progress and cancellation types.

use std::thread;

use toonify::CancellationToken;

#[test]
fn token_starts_live() {
    assert!(!CancellationToken::new().is_cancelled());
    assert!(!CancellationToken::default().is_cancelled());
}

#[test]
fn clones_share_cancellation() {
    let token = CancellationToken::new();
    let remote = token.clone();
    thread::spawn(move || remote.cancel()).join().unwrap();
    assert!(token.is_cancelled());
}

#[test]
fn cancel_is_idempotent() {
    let token = CancellationToken::new();
    token.cancel();
    token.cancel();
    assert!(token.is_cancelled());
}
