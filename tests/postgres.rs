//! Round trips through a real PostgreSQL server.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use gossippg::{
    Config, ConnectionEvent, Connector, Context, Incoming, Listener, PgConnector, PgSubscription,
    Subscription,
};
use serde_json::json;
use tokio::time::{Duration, sleep, timeout};
use tokio_postgres::{Client, NoTls};

async fn admin(database_url: &str) -> Client {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls).await.unwrap();
    tokio::spawn(connection);
    client
}

async fn notify(client: &Client, channel: &str, payload: &str) {
    client
        .execute("SELECT pg_notify($1, $2)", &[&channel, &payload])
        .await
        .unwrap();
}

async fn next_incoming(sub: &mut PgSubscription) -> Incoming {
    timeout(Duration::from_secs(10), sub.recv())
        .await
        .expect("nothing received within 10s")
        .expect("subscription closed")
}

async fn open(config: &Config) -> (PgSubscription, Arc<Mutex<Vec<ConnectionEvent>>>) {
    let observer = RecordingObserver::default();
    let seen = Arc::clone(&observer.0);
    let sub = PgConnector::new(config)
        .open(&config.database_url, Arc::new(observer))
        .await
        .unwrap();
    (sub, seen)
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server in DATABASE_URL"]
async fn test_notify_reaches_handler() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return;
    };

    let (handler, mut events) = RecordingHandler::new();
    let listener = Listener::new(Config::new(database_url.clone()).with_channel("gossippg_test"))
        .with_handler(handler);

    let ctx = Context::new();
    let task = {
        let ctx = ctx.clone();
        tokio::spawn(async move { listener.start(&ctx).await })
    };
    // LISTEN has to be in place before anything is sent.
    sleep(Duration::from_millis(500)).await;

    let client = admin(&database_url).await;
    notify(
        &client,
        "gossippg_test",
        r#"{"type":"order.created","id":"o-1","data":{"amount":42}}"#,
    )
    .await;

    let event = next_event(&mut events).await;
    assert_eq!(event.kind, "order.created");
    assert_eq!(event.id, "o-1");
    assert_eq!(event.data, Some(json!({"amount": 42})));

    ctx.cancel();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server in DATABASE_URL"]
async fn test_burst_beyond_queue_survives_ping() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return;
    };
    let config = Config::new(database_url.clone())
        .with_notification_buffer(2)
        .with_probe_timeout(Duration::from_secs(2));
    let (mut sub, seen) = open(&config).await;
    sub.listen("gossippg_burst").await.unwrap();

    let client = admin(&database_url).await;
    for i in 0..10 {
        notify(&client, "gossippg_burst", &format!(r#"{{"type":"t","id":"{i}"}}"#)).await;
    }
    sleep(Duration::from_millis(200)).await;

    sub.ping().await.unwrap();
    for i in 0..10 {
        match next_incoming(&mut sub).await {
            Incoming::Notification(n) => {
                assert_eq!(n.payload, format!(r#"{{"type":"t","id":"{i}"}}"#))
            }
            Incoming::Placeholder => panic!("unexpected reconnect before id {i}"),
        }
    }
    assert_eq!(*seen.lock().unwrap(), vec![ConnectionEvent::Connected]);

    sub.unlisten_all().await.unwrap();
    sub.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server in DATABASE_URL"]
async fn test_reconnects_after_backend_terminated() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return;
    };
    let config = Config::new(database_url.clone())
        .with_reconnect_interval(Duration::from_millis(100), Duration::from_secs(1));
    let (mut sub, seen) = open(&config).await;
    sub.listen("gossippg_reconnect").await.unwrap();

    let client = admin(&database_url).await;
    let killed: i64 = client
        .query_one(
            "SELECT count(pg_terminate_backend(pid)) FROM pg_stat_activity \
             WHERE query = 'LISTEN \"gossippg_reconnect\"' AND pid <> pg_backend_pid()",
            &[],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(killed, 1);

    // The placeholder only shows up once LISTEN is back in place.
    assert_eq!(next_incoming(&mut sub).await, Incoming::Placeholder);

    notify(&client, "gossippg_reconnect", r#"{"type":"t","id":"after"}"#).await;
    match next_incoming(&mut sub).await {
        Incoming::Notification(n) => {
            assert_eq!(n.channel, "gossippg_reconnect");
            assert_eq!(n.payload, r#"{"type":"t","id":"after"}"#);
        }
        Incoming::Placeholder => panic!("second placeholder"),
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionEvent::Connected,
            ConnectionEvent::Disconnected,
            ConnectionEvent::Reconnected,
        ]
    );

    sub.unlisten_all().await.unwrap();
    sub.close().await.unwrap();
}
