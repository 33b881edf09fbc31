//! Triggers: interned contract names between definers and users.
//!
//! A trigger names something a target consumes — "module `a` defines name
//! `X` with this signature". The definer's module fires the trigger when
//! that contract changes; every subscribed target is then re-analyzed.
//! Trigger names use the angle-bracketed fullname convention (`<a.X>`,
//! `<a>` for "anything in module a").

use rustc_hash::{FxHashMap, FxHashSet};

/// Interned trigger handle.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TriggerId(u32);

impl TriggerId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TriggerId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TriggerId({})", self.0)
    }
}

/// The canonical trigger name for a fully-qualified name.
pub fn make_trigger(fullname: &str) -> String {
    format!("<{fullname}>")
}

/// A target, addressed by module and fully-qualified name.
pub type TargetKey = (String, String);

/// Interner plus subscription table.
#[derive(Debug, Default)]
pub struct TriggerMap {
    names: Vec<String>,
    by_name: FxHashMap<String, TriggerId>,
    subscribers: FxHashMap<TriggerId, FxHashSet<TargetKey>>,
}

impl TriggerMap {
    pub fn new() -> Self {
        TriggerMap::default()
    }

    pub fn intern(&mut self, name: &str) -> TriggerId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TriggerId::from_raw(u32::try_from(self.names.len()).unwrap_or(u32::MAX));
        self.names.push(name.to_owned());
        self.by_name.insert(name.to_owned(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<TriggerId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: TriggerId) -> &str {
        &self.names[id.raw() as usize]
    }

    /// Subscribe a target to a trigger.
    pub fn subscribe(&mut self, trigger: TriggerId, target: TargetKey) {
        self.subscribers.entry(trigger).or_default().insert(target);
    }

    /// Drop every subscription held by `target`.
    pub fn unsubscribe_target(&mut self, target: &TargetKey) {
        for subs in self.subscribers.values_mut() {
            subs.remove(target);
        }
    }

    /// Drop every subscription held by any target of `module`.
    pub fn unsubscribe_module(&mut self, module: &str) {
        for subs in self.subscribers.values_mut() {
            subs.retain(|(m, _)| m != module);
        }
    }

    /// Targets subscribed to a trigger, in deterministic order.
    pub fn fire(&self, trigger: TriggerId) -> Vec<TargetKey> {
        let mut targets: Vec<TargetKey> = self
            .subscribers
            .get(&trigger)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        targets.sort();
        targets
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interning_is_idempotent() {
        let mut map = TriggerMap::new();
        let a = map.intern("<a.X>");
        let b = map.intern("<a.X>");
        assert_eq!(a, b);
        assert_eq!(map.name(a), "<a.X>");
        assert_eq!(map.lookup("<a.X>"), Some(a));
        assert_eq!(map.lookup("<a.Y>"), None);
    }

    #[test]
    fn make_trigger_wraps_in_angle_brackets() {
        assert_eq!(make_trigger("a.X"), "<a.X>");
        assert_eq!(make_trigger("a"), "<a>");
    }

    #[test]
    fn fire_returns_subscribers_sorted() {
        let mut map = TriggerMap::new();
        let t = map.intern("<a.X>");
        map.subscribe(t, ("z".to_owned(), "z".to_owned()));
        map.subscribe(t, ("b".to_owned(), "b.f".to_owned()));
        let fired = map.fire(t);
        assert_eq!(
            fired,
            vec![
                ("b".to_owned(), "b.f".to_owned()),
                ("z".to_owned(), "z".to_owned()),
            ]
        );
    }

    #[test]
    fn unsubscribe_module_drops_all_its_targets() {
        let mut map = TriggerMap::new();
        let t = map.intern("<a.X>");
        map.subscribe(t, ("b".to_owned(), "b".to_owned()));
        map.subscribe(t, ("b".to_owned(), "b.f".to_owned()));
        map.subscribe(t, ("c".to_owned(), "c".to_owned()));
        map.unsubscribe_module("b");
        assert_eq!(map.fire(t), vec![("c".to_owned(), "c".to_owned())]);
    }
}
