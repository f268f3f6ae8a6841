//! Records bus events so tests can assert on what was published.

use std::sync::{Arc, Mutex};

use bubble_bus::{EventBus, Subscription};
use bubble_core::domains::groups::BubbleFormed;
use bubble_core::domains::matching::MatchCreated;

#[derive(Clone, Default)]
pub struct EventRecorder {
    formed: Arc<Mutex<Vec<BubbleFormed>>>,
    matched: Arc<Mutex<Vec<MatchCreated>>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();

        let formed = recorder.formed.clone();
        let matched = recorder.matched.clone();
        let subscriptions = vec![
            bus.subscribe(move |e: &BubbleFormed| {
                formed.lock().unwrap().push(e.clone());
                Ok(())
            }),
            bus.subscribe(move |e: &MatchCreated| {
                matched.lock().unwrap().push(e.clone());
                Ok(())
            }),
        ];
        *recorder.subscriptions.lock().unwrap() = subscriptions;
        recorder
    }

    pub fn formed(&self) -> Vec<BubbleFormed> {
        self.formed.lock().unwrap().clone()
    }

    pub fn matched(&self) -> Vec<MatchCreated> {
        self.matched.lock().unwrap().clone()
    }

    pub fn detach(&self) {
        for subscription in self.subscriptions.lock().unwrap().iter() {
            subscription.unsubscribe();
        }
    }
}
