use super::HandoffQueue;
use crate::Error;
use core::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn offer_waits_for_a_taker() {
    let queue = HandoffQueue::<u32>::new();
    let token = CancellationToken::new();

    let pending = timeout(Duration::from_secs(5), queue.offer(1, &token)).await;
    assert!(pending.is_err(), "offer completed without a taker");
}

#[tokio::test(start_paused = true)]
async fn offer_and_take_meet() {
    let queue = HandoffQueue::<u32>::new();
    let token = CancellationToken::new();

    let taker = {
        let queue = queue.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let item = queue.take(&token).await;
            (item, Instant::now())
        })
    };

    // Let the taker park on the queue before the producer shows up.
    sleep(Duration::from_millis(250)).await;
    queue.offer(42, &token).await.unwrap();
    let offered_at = Instant::now();

    let (item, taken_at) = taker.await.unwrap();
    assert_eq!(item, Ok(42));
    assert_eq!(offered_at, taken_at);
}

#[tokio::test(start_paused = true)]
async fn offer_completes_only_when_taker_arrives() {
    let queue = HandoffQueue::<u32>::new();
    let token = CancellationToken::new();

    let offerer = {
        let queue = queue.clone();
        let token = token.clone();
        tokio::spawn(async move {
            queue.offer(7, &token).await.unwrap();
            Instant::now()
        })
    };

    let start = Instant::now();
    sleep(Duration::from_secs(3)).await;
    assert!(!offerer.is_finished());

    assert_eq!(queue.take(&token).await, Ok(7));
    let completed_at = offerer.await.unwrap();
    assert!(completed_at - start >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn cancelled_taker_exits_and_its_slot_is_skipped() {
    let queue = HandoffQueue::<u32>::new();
    let root = CancellationToken::new();
    let early = root.child_token();

    let quitter = {
        let queue = queue.clone();
        let early = early.clone();
        tokio::spawn(async move { queue.take(&early).await })
    };
    sleep(Duration::from_millis(10)).await;
    early.cancel();
    assert_eq!(quitter.await.unwrap(), Err(Error::Cancelled));

    // The stale slot must not swallow the item: with nobody waiting the offer
    // stays pending.
    let pending = timeout(Duration::from_secs(1), queue.offer(1, &root)).await;
    assert!(pending.is_err());

    let taker = {
        let queue = queue.clone();
        let root = root.clone();
        tokio::spawn(async move { queue.take(&root).await })
    };
    queue.offer(2, &root).await.unwrap();
    assert_eq!(taker.await.unwrap(), Ok(2));
}

#[tokio::test(start_paused = true)]
async fn cancelled_offer_drops_the_item() {
    let queue = HandoffQueue::<u32>::new();
    let token = CancellationToken::new();

    let offerer = {
        let queue = queue.clone();
        let token = token.clone();
        tokio::spawn(async move { queue.offer(9, &token).await })
    };
    sleep(Duration::from_millis(10)).await;
    token.cancel();
    assert_eq!(offerer.await.unwrap(), Err(Error::Cancelled));

    let fresh = CancellationToken::new();
    let after = timeout(Duration::from_secs(1), queue.take(&fresh)).await;
    assert!(after.is_err(), "cancelled offer left an item behind");
}

#[tokio::test]
async fn take_on_cancelled_token_returns_immediately() {
    let queue = HandoffQueue::<u32>::new();
    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(queue.take(&token).await, Err(Error::Cancelled));
    assert_eq!(queue.offer(1, &token).await, Err(Error::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn every_item_reaches_exactly_one_taker() {
    const TAKERS: usize = 3;
    const ITEMS: u32 = 30;

    let queue = HandoffQueue::<u32>::new();
    let token = CancellationToken::new();

    let takers: Vec<_> = (0..TAKERS)
        .map(|_| {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                while let Ok(item) = queue.take(&token).await {
                    received.push(item);
                }
                received
            })
        })
        .collect();

    for item in 0..ITEMS {
        queue.offer(item, &token).await.unwrap();
    }
    // Give the last taker a chance to record its item before shutdown.
    sleep(Duration::from_millis(10)).await;
    token.cancel();

    let mut all = Vec::new();
    for taker in takers {
        all.extend(taker.await.unwrap());
    }
    all.sort_unstable();
    assert_eq!(all, (0..ITEMS).collect::<Vec<_>>());
}
