//! End-to-end tests of `AlorClient` against a mocked REST API and an
//! in-memory streaming transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rust_decimal_macros::dec;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use alor::auth::{OAuthRefresher, TokenProvider};
use alor::config::{AlorConfig, Environment};
use alor::models::{Interval, SubscribeOptions};
use alor::rest::RestClient;
use alor::websocket::{CloseReason, SessionState};
use alor::{AlorClient, AlorError, EventKind, StreamEvent};

use common::{FakeDialer, FakeServer};

async fn mock_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .and(query_param("token", "refresh-secret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"AccessToken": "jwt"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/md/v2/Securities/MOEX/SBER"))
        .and(header("authorization", "Bearer jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "symbol": "SBER",
            "shortname": "Sberbank",
            "exchange": "MOEX"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/md/v2/Securities/MOEX/NOPE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn client(server: &MockServer, dialer: Arc<FakeDialer>) -> AlorClient {
    let mut config = AlorConfig::new(Environment::Test).with_refresh_token("refresh-secret");
    config.api_url = server.uri();
    config.oauth_url = server.uri();
    config.stream.ping_interval = None;

    let http = reqwest::Client::new();
    let refresher = Arc::new(OAuthRefresher::new(http.clone(), config.oauth_url.clone()));
    let tokens = Arc::new(TokenProvider::new(config.refresh_token.clone(), refresher));
    let rest = RestClient::new(
        http,
        config.api_url.clone(),
        config.exchange.clone(),
        tokens.clone(),
    );

    AlorClient::with_parts(config, tokens, rest.clone(), Arc::new(rest), dialer)
}

async fn accept(servers: &mut futures::channel::mpsc::UnboundedReceiver<FakeServer>) -> FakeServer {
    tokio::time::timeout(Duration::from_secs(5), servers.next())
        .await
        .expect("no connection")
        .expect("dialer dropped")
}

#[tokio::test]
async fn test_quote_subscription_delivers_events_until_shutdown() {
    let api = mock_api().await;
    let (dialer, mut servers) = FakeDialer::new();
    let client = client(&api, dialer.clone());
    let mut quotes = client.events().stream(EventKind::Quote);

    let handle = client
        .subscribe_quotes("SBER", SubscribeOptions::default())
        .await
        .expect("subscription failed");
    assert_eq!(handle.guid(), "quote|SBER");
    assert_eq!(dialer.dialed(), vec!["wss://apidev.alor.ru/ws".to_string()]);

    let mut server = accept(&mut servers).await;
    let subscribe = server.next_json().await;
    assert_eq!(subscribe["opcode"], "QuotesSubscribe");
    assert_eq!(subscribe["token"], "jwt");
    assert_eq!(subscribe["exchange"], "MOEX");
    assert_eq!(subscribe["freq"], 175);

    server.push(r#"{"message":"Handled successfully","httpCode":200,"requestGuid":"quote|SBER"}"#);
    server.push(
        r#"{"data":{"symbol":"SBER","exchange":"MOEX","last_price":315.5,"bid":315.4,"ask":315.6},"guid":"quote|SBER"}"#,
    );

    let event = tokio::time::timeout(Duration::from_secs(5), quotes.next())
        .await
        .expect("no quote delivered")
        .expect("event stream ended");
    let StreamEvent::Quote(quote) = event else {
        panic!("expected a quote, got {event:?}");
    };
    assert_eq!(quote.last_price, Some(dec!(315.5)));
    assert_eq!(handle.state(), SessionState::Streaming);

    client.shutdown();
    let reason = tokio::time::timeout(Duration::from_secs(5), handle.closed())
        .await
        .expect("session did not close");
    assert_eq!(reason, CloseReason::Cancelled);
    assert!(!handle.close());
}

#[tokio::test]
async fn test_candle_subscription_publishes_only_closed_bars() {
    let api = mock_api().await;
    let (dialer, mut servers) = FakeDialer::new();
    let client = client(&api, dialer);

    let closed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&closed);
    client
        .events()
        .on_candle_closed(move |candle| sink.lock().push(candle.clone()));
    let mut stream = client.events().stream(EventKind::CandleClosed);

    let handle = client
        .subscribe_candles("SBER", Interval::M5, SubscribeOptions::default())
        .await
        .unwrap();
    assert_eq!(handle.guid(), "candle|SBER|300");

    let mut server = accept(&mut servers).await;
    let subscribe = server.next_json().await;
    assert_eq!(subscribe["tf"], "300");
    assert_eq!(subscribe["skipHistory"], true);

    for (time, close) in [(300, "10.1"), (300, "10.2"), (600, "10.3"), (600, "10.4")] {
        server.push(&format!(
            r#"{{"data":{{"time":{time},"open":10,"high":11,"low":9,"close":{close},"volume":1}},"guid":"candle|SBER|300"}}"#
        ));
    }

    let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    let StreamEvent::CandleClosed(candle) = event else {
        panic!("expected a closed candle");
    };
    assert_eq!(candle.time, 300);
    assert_eq!(candle.close, dec!(10.2));
    assert_eq!(candle.interval, Some(Interval::M5));

    // Both consumers saw the same single bar; the open 600 bar is held.
    assert_eq!(closed.lock().len(), 1);

    assert!(handle.close());
    assert_eq!(handle.closed().await, CloseReason::Requested);
}

#[tokio::test]
async fn test_unknown_instrument_is_not_subscribed() {
    let api = mock_api().await;
    let (dialer, _servers) = FakeDialer::new();
    let client = client(&api, dialer.clone());

    let err = client
        .subscribe_order_book("NOPE", SubscribeOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AlorError::InstrumentNotFound { .. }));
    assert!(dialer.dialed().is_empty());
}
