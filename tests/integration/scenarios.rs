//! End-to-end desk scenarios.
//!
//! Wires the real registry, session store, cache, updater, router and event
//! loop to the in-memory transport and quote source, then drives them the
//! way a dealer would.

use std::sync::Arc;
use std::time::Duration;

use bullion_desk::bot::{CommandRouter, EventLoop, LoopTiming};
use bullion_desk::format::SecondaryCurrency;
use bullion_desk::market::{MarketDataCache, RateUpdater, UpdaterTiming};
use bullion_desk::registry::Registry;
use bullion_desk::session::{SessionState, SessionStore};
use bullion_desk::types::{DeskError, Trend};

use crate::fake_transport::*;

struct Desk {
    transport: Arc<FakeTransport>,
    quotes: Arc<FakeQuoteSource>,
    cache: Arc<MarketDataCache>,
    sessions: Arc<SessionStore>,
    updater: Arc<RateUpdater>,
    event_loop: Arc<EventLoop>,
}

fn fast_timing() -> LoopTiming {
    LoopTiming {
        poll_timeout: Duration::ZERO,
        transport_error_pause: Duration::from_millis(10),
        restart_pause: Duration::from_millis(10),
    }
}

fn desk_with(transport: FakeTransport, quote: f64) -> Desk {
    let transport = Arc::new(transport);
    let quotes = Arc::new(FakeQuoteSource::new(quote));
    let registry = Arc::new(Registry::builtin());
    let sessions = Arc::new(SessionStore::new(registry.clone()));
    let cache = Arc::new(MarketDataCache::new(2000.0));
    let updater = Arc::new(RateUpdater::new(quotes.clone(), cache.clone(), UpdaterTiming::default()));
    let router = CommandRouter::new(registry, sessions.clone(), cache.clone(), SecondaryCurrency::default())
        .with_refresher(updater.clone());
    let event_loop = Arc::new(EventLoop::new(transport.clone(), router, fast_timing()).with_updater(updater.clone()));
    Desk {
        transport,
        quotes,
        cache,
        sessions,
        updater,
        event_loop,
    }
}

fn desk(quote: f64) -> Desk {
    desk_with(FakeTransport::new(), quote)
}

fn texts(out: &[Outbound]) -> Vec<String> {
    out.iter().filter_map(|o| o.text().map(str::to_string)).collect()
}

#[tokio::test]
async fn test_dealer_login_journey() {
    let d = desk(2345.5);
    d.event_loop.warm_up().await;
    assert_eq!(d.cache.read().price_usd_per_ounce, 2345.5);

    // /start shows one button per active dealer plus the rate button
    d.transport.push_batch(vec![command(1, "start")]);
    d.event_loop.poll_once().await.unwrap();
    let out = d.transport.take_outbound();
    assert_eq!(out.len(), 1);
    let kb = out[0].keyboard().expect("menu keyboard");
    let payloads: Vec<_> = kb.buttons().map(|b| b.payload.clone()).collect();
    let active = Registry::builtin().active_dealers().len();
    assert_eq!(payloads.len(), active + 1);
    assert!(payloads.contains(&"login_2270".to_string()));
    assert_eq!(payloads.last().unwrap(), "show_rate");

    // pressing the dealer edits the menu into a PIN prompt
    d.transport.push_batch(vec![press(2, "login_2270", 100)]);
    d.event_loop.poll_once().await.unwrap();
    let out = d.transport.take_outbound();
    assert_eq!(out[0], Outbound::Answer { query_id: "cb-2".into(), text: None });
    let Outbound::Edit { message_id, text: prompt, .. } = &out[1] else {
        panic!("expected menu edit, got {out:?}");
    };
    assert_eq!(*message_id, 100);
    assert!(prompt.contains("Peiman"));
    assert_eq!(d.sessions.current_state(USER), SessionState::AwaitingPin);

    // correct PIN: scrubbed, welcomed with the cached price
    d.transport.push_batch(vec![text(3, "2270")]);
    d.event_loop.poll_once().await.unwrap();
    let out = d.transport.take_outbound();
    assert_eq!(out[0], Outbound::Delete { chat_id: CHAT, message_id: 3 });
    let body = texts(&out).join("\n");
    assert!(body.contains("Welcome, Peiman"));
    assert!(body.contains("$2,345.50"));
    assert_eq!(d.sessions.current_state(USER), SessionState::Authenticated);

    // the same text again is not a second login
    d.transport.push_batch(vec![text(4, "2270")]);
    d.event_loop.poll_once().await.unwrap();
    let out = d.transport.take_outbound();
    assert!(!out.iter().any(|o| matches!(o, Outbound::Delete { .. })));
    assert!(texts(&out).join("\n").contains("logged in as Peiman"));
    assert_eq!(d.sessions.current_state(USER), SessionState::Authenticated);
}

#[tokio::test]
async fn test_wrong_pins_then_right_pin() {
    let d = desk(2400.0);
    d.transport.push_batch(vec![
        command(1, "start"),
        press(2, "login_3184", 50),
        text(3, "2270"),
        text(4, "0000"),
    ]);
    d.event_loop.poll_once().await.unwrap();
    let rejections = texts(&d.transport.take_outbound())
        .iter()
        .filter(|t| t.contains("Incorrect PIN"))
        .count();
    assert_eq!(rejections, 2);
    assert_eq!(d.sessions.current_state(USER), SessionState::AwaitingPin);

    d.transport.push_batch(vec![text(5, "3184")]);
    d.event_loop.poll_once().await.unwrap();
    assert_eq!(d.sessions.current_state(USER), SessionState::Authenticated);
    assert_eq!(d.sessions.session(USER).unwrap().dealer().display_name, "Sara");
}

#[tokio::test]
async fn test_out_of_band_quote_keeps_previous_rate() {
    let d = desk(2345.5);
    d.updater.refresh_once().await.unwrap();

    d.quotes.set_price(15000.0);
    assert_eq!(d.updater.refresh_once().await, Err(DeskError::InvalidQuoteValue(15000.0)));
    assert_eq!(d.cache.read().price_usd_per_ounce, 2345.5);

    d.transport.push_batch(vec![press(1, "show_rate", 77)]);
    d.event_loop.poll_once().await.unwrap();
    let body = texts(&d.transport.take_outbound()).join("\n");
    assert!(body.contains("$2,345.50"));
    assert!(!body.contains("15,000"));
}

#[tokio::test]
async fn test_quote_outage_keeps_snapshot() {
    let d = desk(2100.0);
    d.updater.refresh_once().await.unwrap();
    d.quotes.set_error("HTTP 503");
    assert!(matches!(d.updater.refresh_once().await, Err(DeskError::QuoteFetch(_))));

    let snap = d.cache.read();
    assert_eq!(snap.price_usd_per_ounce, 2100.0);
    assert_eq!(snap.trend, Trend::Up);
}

#[tokio::test]
async fn test_transport_failure_then_recovery_keeps_sessions() {
    let d = desk(2345.5);
    d.transport.push_batch(vec![press(1, "login_2270", 10)]);
    d.transport.push(PollStep::Fail("connection reset".into()));
    d.transport.push_batch(vec![text(2, "2270")]);

    d.event_loop.poll_once().await.unwrap();
    let err = d.event_loop.poll_once().await.unwrap_err();
    assert!(matches!(err, DeskError::Transport(_)));
    assert_eq!(d.sessions.current_state(USER), SessionState::AwaitingPin);

    d.event_loop.poll_once().await.unwrap();
    assert_eq!(d.sessions.current_state(USER), SessionState::Authenticated);
    assert_eq!(d.transport.offsets(), vec![0, 2, 2]);
}

#[tokio::test]
async fn test_supervisor_survives_errors_and_panics() {
    let d = desk(2345.5);
    d.transport.push_batch(vec![command(1, "start")]);
    d.transport.push(PollStep::Fail("network down".into()));
    d.transport.push_batch(vec![press(2, "login_2270", 1)]);
    d.transport.push(PollStep::Panic("decoder bug".into()));
    d.transport.push_batch(vec![text(3, "2270")]);

    let event_loop = d.event_loop.clone();
    let result = tokio::time::timeout(Duration::from_millis(500), event_loop.run_forever()).await;
    assert!(result.is_err(), "supervisor must never return");

    assert_eq!(d.transport.pending_steps(), 0);
    assert_eq!(d.sessions.current_state(USER), SessionState::Authenticated);
    assert!(texts(&d.transport.outbound()).iter().any(|t| t.contains("Welcome, Peiman")));

    // the restarted run resumes from the stored offset
    let offsets = d.transport.offsets();
    assert_eq!(&offsets[..5], &[0, 2, 2, 3, 3]);
    assert_eq!(d.event_loop.next_offset(), 4);
}

#[tokio::test]
async fn test_panicking_update_keeps_rest_of_batch() {
    let d = desk_with(FakeTransport::new().with_panicking_send("Unknown command"), 2345.5);
    d.transport.push_batch(vec![command(1, "bogus"), press(2, "login_2270", 10)]);

    let event_loop = d.event_loop.clone();
    let _ = tokio::time::timeout(Duration::from_millis(300), event_loop.run_forever()).await;

    assert_eq!(d.sessions.current_state(USER), SessionState::AwaitingPin);
    assert!(texts(&d.transport.outbound()).iter().any(|t| t.contains("Peiman")));
    assert_eq!(&d.transport.offsets()[..2], &[0, 3]);
    assert_eq!(d.event_loop.next_offset(), 3);
}

#[tokio::test]
async fn test_padded_pin_is_rejected() {
    let d = desk(2345.5);
    d.transport.push_batch(vec![press(1, "login_2270", 10), text(2, " 2270 ")]);
    d.event_loop.poll_once().await.unwrap();

    assert!(texts(&d.transport.outbound()).iter().any(|t| t.contains("Incorrect PIN")));
    assert_eq!(d.sessions.current_state(USER), SessionState::AwaitingPin);
}

#[tokio::test]
async fn test_pin_scrub_failure_is_ignored() {
    let d = desk_with(FakeTransport::new().with_failing_deletes(), 2345.5);
    d.transport.push_batch(vec![press(1, "login_2270", 10), text(2, "2270")]);
    d.event_loop.poll_once().await.unwrap();

    let out = d.transport.outbound();
    assert!(!out.iter().any(|o| matches!(o, Outbound::Delete { .. })));
    assert!(texts(&out).iter().any(|t| t.contains("Welcome, Peiman")));
    assert_eq!(d.sessions.current_state(USER), SessionState::Authenticated);
}

#[tokio::test]
async fn test_start_triggers_background_refresh() {
    let d = desk(2600.0);
    d.transport.push_batch(vec![command(1, "start")]);
    d.event_loop.poll_once().await.unwrap();

    for _ in 0..50 {
        if d.cache.read().price_usd_per_ounce == 2600.0 {
            assert!(d.quotes.calls() >= 1);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("opportunistic refresh never landed");
}

#[tokio::test]
async fn test_start_clears_login_in_progress() {
    let d = desk(2345.5);
    d.transport.push_batch(vec![press(1, "login_2270", 10), command(2, "start"), text(3, "2270")]);
    d.event_loop.poll_once().await.unwrap();

    assert_eq!(d.sessions.current_state(USER), SessionState::Anonymous);
    let last = d.transport.outbound().last().cloned().unwrap();
    assert!(last.text().unwrap().contains("/start"));
}
