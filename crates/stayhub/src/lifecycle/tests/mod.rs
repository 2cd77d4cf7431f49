mod common;
mod inbox;
mod subscriptions;
