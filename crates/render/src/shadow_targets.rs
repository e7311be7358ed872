use scenegraph_common::LightId;
use std::collections::{BTreeMap, btree_map};

/// A GPU object that must be released explicitly while its device is alive.
pub trait GpuResource {
    fn release(&mut self);
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    target: T,
}

/// Shadow render targets owned on behalf of lights, one per light.
///
/// A light's target is recreated only when its shadow generation changes;
/// the previous target is released before the new one is created.
#[derive(Debug)]
pub struct ShadowTargets<T: GpuResource> {
    entries: BTreeMap<LightId, Slot<T>>,
}

impl<T: GpuResource> Default for ShadowTargets<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: GpuResource> ShadowTargets<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `light` has a target for `generation`, creating it with
    /// `create` if it is missing or outdated.
    pub fn reconcile<E>(
        &mut self,
        light: LightId,
        generation: u64,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        match self.entries.entry(light) {
            btree_map::Entry::Occupied(slot) if slot.get().generation == generation => {
                Ok(&slot.into_mut().target)
            }
            btree_map::Entry::Occupied(mut slot) => {
                tracing::debug!(light = %light, from = slot.get().generation, to = generation, "recreating shadow target");
                slot.get_mut().target.release();
                match create() {
                    Ok(target) => {
                        *slot.get_mut() = Slot { generation, target };
                        Ok(&slot.into_mut().target)
                    }
                    Err(e) => {
                        slot.remove();
                        Err(e)
                    }
                }
            }
            btree_map::Entry::Vacant(slot) => {
                let target = create()?;
                Ok(&slot.insert(Slot { generation, target }).target)
            }
        }
    }

    pub fn get(&self, light: LightId) -> Option<&T> {
        self.entries.get(&light).map(|e| &e.target)
    }

    /// Release and forget the target of one light.
    pub fn release(&mut self, light: LightId) -> bool {
        match self.entries.remove(&light) {
            Some(mut e) => {
                e.target.release();
                true
            }
            None => false,
        }
    }

    /// Release targets of lights for which `keep` returns false.
    pub fn release_unless(&mut self, mut keep: impl FnMut(LightId) -> bool) -> usize {
        let stale: Vec<LightId> = self.entries.keys().copied().filter(|l| !keep(*l)).collect();
        for light in &stale {
            self.release(*light);
        }
        stale.len()
    }

    pub fn release_all(&mut self) {
        for (_, mut e) in std::mem::take(&mut self.entries) {
            e.target.release();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FakeTarget {
        handle: u32,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl GpuResource for FakeTarget {
        fn release(&mut self) {
            self.log.borrow_mut().push(format!("release {}", self.handle));
        }
    }

    fn maker(
        log: &Rc<RefCell<Vec<String>>>,
        next: &mut u32,
    ) -> impl FnOnce() -> Result<FakeTarget, ()> {
        *next += 1;
        let handle = *next;
        let log = Rc::clone(log);
        move || {
            log.borrow_mut().push(format!("create {handle}"));
            Ok(FakeTarget { handle, log })
        }
    }

    #[test]
    fn same_generation_reuses_target() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut next = 0;
        let mut targets = ShadowTargets::new();
        let light = LightId::new();
        targets.reconcile(light, 1, maker(&log, &mut next)).unwrap();
        let handle = targets.reconcile(light, 1, maker(&log, &mut next)).unwrap().handle;
        assert_eq!(handle, 1);
        assert_eq!(*log.borrow(), vec!["create 1"]);
    }

    #[test]
    fn new_generation_releases_before_creating() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut next = 0;
        let mut targets = ShadowTargets::new();
        let light = LightId::new();
        targets.reconcile(light, 1, maker(&log, &mut next)).unwrap();
        targets.reconcile(light, 2, maker(&log, &mut next)).unwrap();
        assert_eq!(*log.borrow(), vec!["create 1", "release 1", "create 2"]);
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn equal_resolutions_do_not_alias() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut next = 0;
        let mut targets = ShadowTargets::new();
        let (a, b) = (LightId::new(), LightId::new());
        targets.reconcile(a, 1, maker(&log, &mut next)).unwrap();
        targets.reconcile(b, 1, maker(&log, &mut next)).unwrap();
        assert_ne!(targets.get(a).unwrap().handle, targets.get(b).unwrap().handle);

        assert!(targets.release(a));
        assert!(targets.get(b).is_some());
        assert!(!targets.release(a));
    }

    #[test]
    fn failed_creation_leaves_no_entry() {
        let mut targets: ShadowTargets<FakeTarget> = ShadowTargets::new();
        let light = LightId::new();
        let result = targets.reconcile(light, 1, || Err("incomplete"));
        assert_eq!(result.err(), Some("incomplete"));
        assert!(targets.is_empty());
    }

    #[test]
    fn release_all_and_stale_lights() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut next = 0;
        let mut targets = ShadowTargets::new();
        let (a, b) = (LightId::new(), LightId::new());
        targets.reconcile(a, 1, maker(&log, &mut next)).unwrap();
        targets.reconcile(b, 1, maker(&log, &mut next)).unwrap();
        assert_eq!(targets.release_unless(|l| l == a), 1);
        assert_eq!(targets.len(), 1);
        targets.release_all();
        assert!(targets.is_empty());
        assert_eq!(log.borrow().iter().filter(|l| l.starts_with("release")).count(), 2);
    }
}
