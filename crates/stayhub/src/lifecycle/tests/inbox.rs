use std::sync::Arc;

use super::common::*;
use crate::lifecycle::domain::{NotificationId, NotificationKind};
use crate::lifecycle::error::CoordinatorError;
use crate::lifecycle::memory::InMemoryStore;
use crate::lifecycle::notifications::{
    NotificationDispatcher, NotificationInbox, OutboundNotification, StoreDispatcher,
};

#[tokio::test]
async fn store_dispatcher_files_into_the_recipient_inbox() {
    let store = Arc::new(InMemoryStore::new());
    let dispatcher = StoreDispatcher::new(store.clone(), Arc::new(
        crate::lifecycle::clock::ManualClock::new(at(2024, 2, 20)),
    ));
    dispatcher
        .send(
            OutboundNotification::new(
                &tenant().user_id,
                NotificationKind::Booking,
                "Booking Confirmed",
                "Booking bkg-1 was confirmed by the owner.",
            )
            .with("bookingId", "bkg-1"),
        )
        .await
        .expect("stored");

    let inbox = NotificationInbox::new(
        store,
        Arc::new(crate::lifecycle::clock::ManualClock::new(at(2024, 2, 21))),
    );
    let listed = inbox.list(&tenant(), false).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Booking Confirmed");
    assert_eq!(listed[0].metadata.get("bookingId").map(String::as_str), Some("bkg-1"));
    assert!(!listed[0].is_read);
    assert!(inbox.list(&owner(), false).await.expect("list").is_empty());
}

#[tokio::test]
async fn marking_read_is_limited_to_the_recipient() {
    let store = Arc::new(InMemoryStore::new());
    let h = harness_with(
        store.clone(),
        Arc::new(StoreDispatcher::new(
            store.clone(),
            Arc::new(crate::lifecycle::clock::ManualClock::new(at(2024, 2, 20))),
        )),
    )
    .await;
    h.book(day(2024, 3, 10), day(2024, 3, 15)).await;
    h.book(day(2024, 4, 10), day(2024, 4, 15)).await;
    let inbox = &h.marketplace.inbox;

    let owner_inbox = inbox.list(&owner(), true).await.expect("list");
    assert_eq!(owner_inbox.len(), 2);
    assert_eq!(inbox.unread_count(&owner()).await.expect("count"), 2);

    assert_eq!(
        inbox.mark_read(&tenant(), &owner_inbox[0].id).await,
        Err(CoordinatorError::NotFound("Notification"))
    );
    assert_eq!(
        inbox
            .mark_read(&owner(), &NotificationId::from("ntf-missing"))
            .await,
        Err(CoordinatorError::NotFound("Notification"))
    );

    h.clock.set(at(2024, 2, 22));
    let read = inbox
        .mark_read(&owner(), &owner_inbox[0].id)
        .await
        .expect("owner reads");
    assert!(read.is_read);
    assert_eq!(read.read_at, Some(at(2024, 2, 22)));
    assert_eq!(inbox.unread_count(&owner()).await.expect("count"), 1);

    assert_eq!(inbox.mark_all_read(&owner()).await.expect("mark all"), 1);
    assert_eq!(inbox.unread_count(&owner()).await.expect("count"), 0);
    assert_eq!(inbox.list(&owner(), false).await.expect("list").len(), 2);
}
