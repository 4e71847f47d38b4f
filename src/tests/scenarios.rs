use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::broker::{Broker, Message, Priority, Subscriber, SubscriberId, SubscriberState};
use crate::config::Settings;
use crate::utils::BrokerError;

#[tokio::test]
async fn orders_slow_subscriber_drops_while_fast_one_keeps_up() {
    let broker = Broker::<String>::with_settings(Settings::default().broker);
    broker.create_topic("orders").unwrap();

    let slow_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = slow_seen.clone();
    let slow = broker
        .subscribe("orders", "s1", 2, move |msg: Arc<Message<String>>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(msg.payload().clone());
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
        .await
        .expect("subscribe s1");

    let fast_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = fast_seen.clone();
    let fast = broker
        .subscribe("orders", "s2", 10, move |msg: Arc<Message<String>>| {
            sink.lock().unwrap().push(msg.payload().clone());
            std::future::ready(())
        })
        .await
        .expect("subscribe s2");

    let begin = Instant::now();
    for i in 1..=5 {
        broker
            .publish("orders", format!("order-{i}"))
            .await
            .expect("publish must not fail because of a slow subscriber");
    }
    // each publish waits at most the 100ms offer window
    assert!(begin.elapsed() < Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let expected: Vec<String> = (1..=5).map(|i| format!("order-{i}")).collect();
    assert_eq!(*fast_seen.lock().unwrap(), expected);
    assert_eq!(fast.stats().dropped, 0);

    // order-1 is in the handler, order-2 and order-3 fill the buffer of 2,
    // order-4 and order-5 time out and are dropped
    assert_eq!(*slow_seen.lock().unwrap(), vec!["order-1"]);
    assert_eq!(slow.queue_len(), 2);
    assert_eq!(slow.stats().dropped, 2);
    assert_eq!(slow.stats().delivered, 0);

    broker.shutdown().await;
}

#[tokio::test]
async fn publish_to_nonexistent_topic_is_rejected() {
    let broker = Broker::<&'static str>::new();
    let err = broker.publish("nonexistent", "x").await.unwrap_err();
    assert_eq!(err, BrokerError::UnknownTopic("nonexistent".to_string()));
}

#[tokio::test]
async fn broker_shutdown_is_terminal_and_stops_consumers() {
    let broker = Broker::<&'static str>::new();
    broker.create_topic("t").unwrap();
    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();
    let sub = broker
        .subscribe("t", "s", 4, move |_msg| {
            *counter.lock().unwrap() += 1;
            std::future::ready(())
        })
        .await
        .unwrap();

    let begin = Instant::now();
    broker.shutdown().await;
    assert!(begin.elapsed() <= broker.settings().shutdown_timeout() + Duration::from_millis(500));

    let err = broker.publish("t", "y").await.unwrap_err();
    assert_eq!(err, BrokerError::UnknownTopic("t".to_string()));
    assert_eq!(sub.state(), SubscriberState::Terminated);
    assert!(!sub.is_consumer_running());
    assert!(broker.topic_names().is_empty());
    assert_eq!(*count.lock().unwrap(), 0);
}

#[tokio::test]
async fn priorities_travel_with_the_message() {
    let broker = Broker::<u32>::new();
    broker.create_topic("alerts").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    broker
        .subscribe("alerts", "pager", 8, move |msg: Arc<Message<u32>>| {
            sink.lock().unwrap().push((*msg.payload(), msg.priority()));
            std::future::ready(())
        })
        .await
        .unwrap();

    broker
        .publish_with_priority("alerts", 1, Priority::High)
        .await
        .unwrap();
    broker.publish("alerts", 2).await.unwrap();

    for _ in 0..100 {
        if seen.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, Priority::High), (2, Priority::Normal)]
    );
    broker.shutdown().await;
}

#[tokio::test]
async fn subscriber_ids_are_exported_with_the_broker() {
    let broker = Broker::<u32>::new();
    broker.create_topic("metrics").unwrap();
    let sub = broker
        .subscribe("metrics", "collector", 4, |_msg| std::future::ready(()))
        .await
        .unwrap();

    let id: SubscriberId = sub.id().to_string();
    assert_eq!(id, "collector");
    broker.shutdown().await;
}
