use super::{ParamPath, Value};

/// A change published by [`crate::param::ParamTree::set_value`].
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: ParamPath,
    pub value: Value,
}

/// Callback invoked synchronously for every change at or below its scope.
pub type Observer = Box<dyn FnMut(&Change) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    scope: ParamPath,
    observer: Observer,
}

/// Address-scoped subscriptions, notified in registration order.
#[derive(Default)]
pub struct ChangeBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl ChangeBus {
    pub fn subscribe(&mut self, scope: ParamPath, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            scope,
            observer,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub(crate) fn publish(&mut self, change: &Change) {
        for sub in self
            .subscriptions
            .iter_mut()
            .filter(|s| s.scope.contains(&change.path))
        {
            (sub.observer)(change);
        }
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Observer {
        let log = Arc::clone(log);
        Box::new(move |change: &Change| {
            log.lock().unwrap().push(format!("{tag}:{}", change.path));
        })
    }

    #[test]
    fn scoped_observers_fire_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ChangeBus::default();
        bus.subscribe(ParamPath::from(["model", "ncat"]), recorder(&log, "leaf"));
        bus.subscribe(ParamPath::root(), recorder(&log, "root"));
        bus.subscribe(ParamPath::from(["topology"]), recorder(&log, "topology"));
        bus.subscribe(ParamPath::from(["model"]), recorder(&log, "model"));

        bus.publish(&Change {
            path: ParamPath::from(["model", "ncat"]),
            value: Value::Int(4),
        });

        assert_eq!(
            *log.lock().unwrap(),
            vec!["leaf:model.ncat", "root:model.ncat", "model:model.ncat"]
        );
    }

    #[test]
    fn unsubscribed_observers_stop_firing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ChangeBus::default();
        let id = bus.subscribe(ParamPath::root(), recorder(&log, "root"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&Change {
            path: ParamPath::from(["x"]),
            value: Value::Bool(true),
        });
        assert!(log.lock().unwrap().is_empty());
    }
}
