//! Ordering, fairness, and basic flow tests.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::timeout;
use uuid::Uuid;

use super::*;

#[tokio::test]
async fn single_ticket_flow() {
    let (mgr, _clock) = setup();
    let fifo = mgr.create_fifo(FifoConfig::default()).unwrap();
    let t1 = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();

    // The only ticket is the head; wait returns without blocking.
    timeout(Duration::from_secs(1), mgr.wait(fifo, t1))
        .await
        .expect("wait should not block")
        .unwrap();

    let record = mgr.ticket(t1).unwrap().unwrap();
    assert!(record.notified_at.is_some());
    assert!(record.accepted_at.is_some());

    mgr.done(fifo, t1).unwrap();
    assert!(mgr.ticket(t1).unwrap().is_none());

    // done is not idempotent: the second call reports not-found.
    assert!(matches!(
        mgr.done(fifo, t1),
        Err(FifoError::TicketNotFound(_))
    ));
}

#[tokio::test]
async fn second_ticket_blocks_until_done() {
    let (mgr, clock) = setup();
    let fifo = mgr.create_fifo(FifoConfig::default()).unwrap();
    let t1 = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();
    clock.advance(Duration::from_millis(1));
    let t2 = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();

    mgr.wait(fifo, t1).await.unwrap();

    let mgr2 = Arc::clone(&mgr);
    let waiter = tokio::spawn(async move { mgr2.wait(fifo, t2).await });
    settle().await;
    assert!(!waiter.is_finished(), "t2 must not unblock before t1 is done");

    mgr.done(fifo, t1).unwrap();
    timeout(Duration::from_secs(1), waiter)
        .await
        .expect("t2 should unblock after done(t1)")
        .unwrap()
        .unwrap();
    mgr.done(fifo, t2).unwrap();
}

#[tokio::test]
async fn unblock_order_equals_creation_order() {
    let (mgr, clock) = setup();
    let fifo = mgr.create_fifo(FifoConfig::default()).unwrap();

    let mut tickets = Vec::new();
    for _ in 0..5 {
        tickets.push(mgr.create_ticket(fifo, TicketOverrides::default()).unwrap());
        clock.advance(Duration::from_millis(1));
    }

    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for (i, t) in tickets.into_iter().enumerate() {
        let mgr = Arc::clone(&mgr);
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            mgr.wait(fifo, t).await.unwrap();
            order.lock().push(i);
            mgr.done(fifo, t).unwrap();
        }));
    }
    for h in handles {
        timeout(Duration::from_secs(5), h).await.unwrap().unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn broadcast_releases_all_waiters_together() {
    let (mgr, clock) = setup();
    let fifo = mgr.create_fifo(FifoConfig::default()).unwrap();
    let t1 = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();
    clock.advance(Duration::from_millis(1));
    let t2 = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();

    mgr.wait(fifo, t1).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let mgr = Arc::clone(&mgr);
        handles.push(tokio::spawn(async move { mgr.wait(fifo, t2).await }));
    }
    settle().await;
    for h in &handles {
        assert!(!h.is_finished());
    }

    // All observers of t2 unblock on the same notification, before any done.
    mgr.done(fifo, t1).unwrap();
    for h in handles {
        timeout(Duration::from_secs(1), h)
            .await
            .expect("all broadcast waiters should unblock")
            .unwrap()
            .unwrap();
    }
    mgr.done(fifo, t2).unwrap();
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let (mgr, _clock) = setup();
    let fifo = mgr.create_fifo(FifoConfig::default()).unwrap();

    assert!(matches!(
        mgr.wait(fifo, Uuid::new_v4()).await,
        Err(FifoError::TicketNotFound(_))
    ));
    assert!(matches!(
        mgr.done(fifo, Uuid::new_v4()),
        Err(FifoError::TicketNotFound(_))
    ));
    assert!(matches!(
        mgr.create_ticket(Uuid::new_v4(), TicketOverrides::default()),
        Err(FifoError::FifoNotFound(_))
    ));
    assert!(matches!(
        mgr.update_ticket_queue(Uuid::new_v4()),
        Err(FifoError::FifoNotFound(_))
    ));
}

#[tokio::test]
async fn ticket_of_other_fifo_is_rejected() {
    let (mgr, _clock) = setup();
    let f1 = mgr.create_fifo(FifoConfig::default()).unwrap();
    let f2 = mgr.create_fifo(FifoConfig::default()).unwrap();
    let t = mgr.create_ticket(f1, TicketOverrides::default()).unwrap();

    assert!(matches!(
        mgr.wait(f2, t).await,
        Err(FifoError::FifoMismatch)
    ));
    assert!(matches!(mgr.done(f2, t), Err(FifoError::FifoMismatch)));
    // The mismatch must not consume the ticket.
    assert!(mgr.ticket(t).unwrap().is_some());
}

#[tokio::test]
async fn overrides_require_fifo_permission() {
    let (mgr, _clock) = setup();
    let strict = mgr.create_fifo(FifoConfig::default()).unwrap();
    let open = mgr
        .create_fifo(FifoConfig {
            allow_overrides: true,
            ..FifoConfig::default()
        })
        .unwrap();

    let overrides = TicketOverrides {
        accept_timeout: Some(Duration::from_secs(7)),
        ..TicketOverrides::default()
    };

    let ignored = mgr.create_ticket(strict, overrides).unwrap();
    assert_eq!(
        mgr.ticket(ignored).unwrap().unwrap().accept_timeout,
        FifoConfig::default().accept_timeout
    );

    let honored = mgr.create_ticket(open, overrides).unwrap();
    assert_eq!(
        mgr.ticket(honored).unwrap().unwrap().accept_timeout,
        Duration::from_secs(7)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_ticket_is_accepted_at_a_time() {
    let mgr = system_setup();
    let fifo = mgr.create_fifo(FifoConfig::default()).unwrap();

    let active = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();
    for _ in 0..100 {
        let mgr = Arc::clone(&mgr);
        let active = Arc::clone(&active);
        handles.push(tokio::spawn(async move {
            let t = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();
            mgr.wait(fifo, t).await.unwrap();
            assert!(
                active
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok(),
                "two tickets held the queue at once"
            );
            tokio::time::sleep(Duration::from_millis(1)).await;
            active.store(false, Ordering::SeqCst);
            mgr.done(fifo, t).unwrap();
        }));
    }
    for h in handles {
        timeout(Duration::from_secs(30), h).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn queue_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteConfig {
        path: dir.path().join("state"),
        wal_mode: true,
    };
    let clock = Arc::new(TestClock::new());

    let storage = SqliteStorage::new(config.clone()).unwrap();
    storage.migrate().unwrap();
    let mgr = FifoManager::new(storage, clock.clone());
    let fifo = mgr.create_fifo(FifoConfig::default()).unwrap();
    let t1 = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();
    clock.advance(Duration::from_millis(1));
    let t2 = mgr.create_ticket(fifo, TicketOverrides::default()).unwrap();
    drop(mgr);

    // The queue is durable; only in-flight waits are lost on restart.
    let storage = SqliteStorage::new(config).unwrap();
    storage.migrate().unwrap();
    let mgr = FifoManager::new(storage, clock.clone());

    let head = mgr.ticket(t1).unwrap().unwrap();
    assert!(head.notified_at.is_some());

    timeout(Duration::from_secs(1), mgr.wait(fifo, t1))
        .await
        .unwrap()
        .unwrap();
    mgr.done(fifo, t1).unwrap();
    timeout(Duration::from_secs(1), mgr.wait(fifo, t2))
        .await
        .unwrap()
        .unwrap();
    mgr.done(fifo, t2).unwrap();
}
