//! Sources of endpoints: static lists, mutable groups, composites, and
//! fallback chains, all sharing the `EndpointGroup` trait.

use std::cell::RefCell;
use std::rc::Rc;

use futures::task;
use futures::{Async, Future, Poll};

use endpoint::Endpoint;

pub type Snapshot = Rc<Vec<Endpoint>>;

/// A listener is notified with the new snapshot every time membership
/// changes. Held by the owning group; there is no weak-reference dance
/// here since (per DESIGN NOTES) a single-threaded group owns its
/// listener list exclusively and drops it on `Drop`.
pub type Listener = Box<FnMut(&Snapshot)>;

/// A source of an ordered list of endpoints, plus an asynchronous
/// "first-non-empty" handle.
pub trait EndpointGroup {
    /// The current snapshot. Consecutive calls return the same `Rc`
    /// instance as long as membership hasn't changed.
    fn endpoints(&self) -> Snapshot;

    /// Registers a listener invoked on every membership change.
    fn on_change(&self, listener: Listener);

    /// A future that completes with the first non-empty snapshot,
    /// resolving immediately if one is already available.
    fn initial_endpoints_future(&self) -> InitialEndpoints
    where
        Self: Sized + Clone + 'static,
    {
        InitialEndpoints::new(self.clone())
    }
}

fn empty_snapshot() -> Snapshot {
    Rc::new(Vec::new())
}

/// A fixed, immutable list of endpoints.
#[derive(Clone)]
pub struct StaticEndpointGroup {
    snapshot: Snapshot,
}

impl StaticEndpointGroup {
    pub fn new(endpoints: Vec<Endpoint>) -> StaticEndpointGroup {
        StaticEndpointGroup {
            snapshot: Rc::new(endpoints),
        }
    }
}

impl EndpointGroup for StaticEndpointGroup {
    fn endpoints(&self) -> Snapshot {
        self.snapshot.clone()
    }

    // A static group's membership never changes; listeners are accepted
    // but will simply never be invoked.
    fn on_change(&self, _listener: Listener) {}
}

struct DynamicInner {
    snapshot: Snapshot,
    listeners: Vec<Listener>,
}

/// A mutable group whose membership can be replaced at any time via
/// `set_endpoints`.
#[derive(Clone)]
pub struct DynamicEndpointGroup {
    inner: Rc<RefCell<DynamicInner>>,
}

impl DynamicEndpointGroup {
    pub fn new() -> DynamicEndpointGroup {
        DynamicEndpointGroup {
            inner: Rc::new(RefCell::new(DynamicInner {
                snapshot: empty_snapshot(),
                listeners: Vec::new(),
            })),
        }
    }

    pub fn with_endpoints(endpoints: Vec<Endpoint>) -> DynamicEndpointGroup {
        let group = DynamicEndpointGroup::new();
        group.set_endpoints(endpoints);
        group
    }

    /// Atomically replaces membership and notifies listeners.
    pub fn set_endpoints(&self, endpoints: Vec<Endpoint>) {
        let snapshot = Rc::new(endpoints);
        let mut inner = self.inner.borrow_mut();
        inner.snapshot = snapshot.clone();
        for l in inner.listeners.iter_mut() {
            l(&snapshot);
        }
    }
}

impl EndpointGroup for DynamicEndpointGroup {
    fn endpoints(&self) -> Snapshot {
        self.inner.borrow().snapshot.clone()
    }

    fn on_change(&self, listener: Listener) {
        self.inner.borrow_mut().listeners.push(listener);
    }
}

/// Concatenates child groups' snapshots in declaration order. An empty
/// composite is an identity for composition; a composite of a single
/// child is optimized to return that child directly.
pub enum CompositeEndpointGroup {
    Empty,
    Single(Rc<EndpointGroup>),
    Many(Vec<Rc<EndpointGroup>>),
}

impl CompositeEndpointGroup {
    pub fn of(children: Vec<Rc<EndpointGroup>>) -> CompositeEndpointGroup {
        match children.len() {
            0 => CompositeEndpointGroup::Empty,
            1 => CompositeEndpointGroup::Single(children.into_iter().next().unwrap()),
            _ => CompositeEndpointGroup::Many(children),
        }
    }

    fn children(&self) -> Vec<Rc<EndpointGroup>> {
        match *self {
            CompositeEndpointGroup::Empty => Vec::new(),
            CompositeEndpointGroup::Single(ref g) => vec![g.clone()],
            CompositeEndpointGroup::Many(ref gs) => gs.clone(),
        }
    }
}

impl EndpointGroup for CompositeEndpointGroup {
    fn endpoints(&self) -> Snapshot {
        match *self {
            CompositeEndpointGroup::Empty => empty_snapshot(),
            CompositeEndpointGroup::Single(ref g) => g.endpoints(),
            CompositeEndpointGroup::Many(ref gs) => {
                let mut all = Vec::new();
                for g in gs {
                    all.extend(g.endpoints().iter().cloned());
                }
                Rc::new(all)
            }
        }
    }

    fn on_change(&self, listener: Listener) {
        // Re-snapshot the whole composite on any child change; every
        // child gets its own thin forwarding closure sharing the one
        // listener through an `Rc<RefCell<..>>`, since `FnMut` isn't
        // `Clone`.
        match *self {
            CompositeEndpointGroup::Empty => {}
            CompositeEndpointGroup::Single(ref g) => g.on_change(listener),
            CompositeEndpointGroup::Many(ref gs) => {
                let listener = Rc::new(RefCell::new(listener));
                for g in gs {
                    let gs = gs.clone();
                    let listener = listener.clone();
                    g.on_change(Box::new(move |_| {
                        let mut all = Vec::new();
                        for g in &gs {
                            all.extend(g.endpoints().iter().cloned());
                        }
                        (&mut *listener.borrow_mut())(&Rc::new(all));
                    }));
                }
            }
        }
    }
}

/// Exposes `self`'s list if non-empty, otherwise `other`'s.
pub struct FallbackEndpointGroup {
    primary: Rc<EndpointGroup>,
    secondary: Rc<EndpointGroup>,
}

impl FallbackEndpointGroup {
    pub fn or_else(primary: Rc<EndpointGroup>, secondary: Rc<EndpointGroup>) -> FallbackEndpointGroup {
        FallbackEndpointGroup { primary, secondary }
    }
}

impl EndpointGroup for FallbackEndpointGroup {
    fn endpoints(&self) -> Snapshot {
        let primary = self.primary.endpoints();
        if !primary.is_empty() {
            primary
        } else {
            self.secondary.endpoints()
        }
    }

    fn on_change(&self, listener: Listener) {
        // Either child's membership can change the fallback's effective
        // list — primary going empty/non-empty, or secondary changing
        // while primary stays empty — so both are registered, sharing
        // one listener through an `Rc<RefCell<..>>` since `FnMut` isn't
        // `Clone`.
        let listener = Rc::new(RefCell::new(listener));

        let secondary_for_primary = self.secondary.clone();
        let listener_for_primary = listener.clone();
        self.primary.on_change(Box::new(move |snap| {
            if !snap.is_empty() {
                (&mut *listener_for_primary.borrow_mut())(snap);
            } else {
                (&mut *listener_for_primary.borrow_mut())(&secondary_for_primary.endpoints());
            }
        }));

        let primary_for_secondary = self.primary.clone();
        self.secondary.on_change(Box::new(move |snap| {
            let primary_snap = primary_for_secondary.endpoints();
            if !primary_snap.is_empty() {
                (&mut *listener.borrow_mut())(&primary_snap);
            } else {
                (&mut *listener.borrow_mut())(snap);
            }
        }));
    }
}

/// A future that resolves with the first non-empty snapshot a group
/// produces, polling eagerly. `await_initial_endpoints` is this future's
/// blocking form (`.wait()`, provided by `futures::Future`).
pub struct InitialEndpoints<G> {
    group: G,
}

impl<G: EndpointGroup> InitialEndpoints<G> {
    fn new(group: G) -> InitialEndpoints<G> {
        InitialEndpoints { group }
    }
}

impl<G: EndpointGroup> Future for InitialEndpoints<G> {
    type Item = Snapshot;
    type Error = ();

    fn poll(&mut self) -> Poll<Snapshot, ()> {
        let snap = self.group.endpoints();
        if !snap.is_empty() {
            return Ok(Async::Ready(snap));
        }

        // Still empty: arm a one-shot `on_change` listener that wakes
        // this task, so a caller blocked in `.wait()` isn't parked
        // forever per the futures 0.1 polling contract.
        let task = task::current();
        self.group.on_change(Box::new(move |_| task.notify()));

        // The registration above can race a membership change that
        // happened between the `endpoints()` read and `on_change`
        // returning; re-check before yielding.
        if self.group.endpoints().is_empty() {
            Ok(Async::NotReady)
        } else {
            Ok(Async::Ready(self.group.endpoints()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint::Endpoint;

    #[test]
    fn static_group_snapshot_is_stable() {
        let g = StaticEndpointGroup::new(vec![Endpoint::of_host("a").unwrap()]);
        let s1 = g.endpoints();
        let s2 = g.endpoints();
        assert!(Rc::ptr_eq(&s1, &s2));
    }

    #[test]
    fn dynamic_group_replaces_membership() {
        let g = DynamicEndpointGroup::new();
        assert!(g.endpoints().is_empty());
        g.set_endpoints(vec![Endpoint::of_host("a").unwrap()]);
        assert_eq!(g.endpoints().len(), 1);
    }

    #[test]
    fn composite_concatenates_in_order() {
        let a: Rc<EndpointGroup> = Rc::new(StaticEndpointGroup::new(vec![
            Endpoint::of_host("a").unwrap(),
        ]));
        let b: Rc<EndpointGroup> = Rc::new(StaticEndpointGroup::new(vec![
            Endpoint::of_host("b").unwrap(),
        ]));
        let c = CompositeEndpointGroup::of(vec![a, b]);
        let hosts: Vec<_> = c.endpoints().iter().map(|e| e.host().to_string()).collect();
        assert_eq!(hosts, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_composite_is_identity() {
        let c = CompositeEndpointGroup::of(Vec::new());
        assert!(c.endpoints().is_empty());
    }

    #[test]
    fn fallback_prefers_primary_when_non_empty() {
        let primary: Rc<EndpointGroup> = Rc::new(StaticEndpointGroup::new(vec![
            Endpoint::of_host("p").unwrap(),
        ]));
        let secondary: Rc<EndpointGroup> = Rc::new(StaticEndpointGroup::new(vec![
            Endpoint::of_host("s").unwrap(),
        ]));
        let f = FallbackEndpointGroup::or_else(primary, secondary);
        assert_eq!(f.endpoints()[0].host(), "p");
    }

    #[test]
    fn fallback_uses_secondary_when_primary_empty() {
        let primary: Rc<EndpointGroup> = Rc::new(StaticEndpointGroup::new(Vec::new()));
        let secondary: Rc<EndpointGroup> = Rc::new(StaticEndpointGroup::new(vec![
            Endpoint::of_host("s").unwrap(),
        ]));
        let f = FallbackEndpointGroup::or_else(primary, secondary);
        assert_eq!(f.endpoints()[0].host(), "s");
    }
}
