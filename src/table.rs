//! # Table
//!
//! Dispatch tables mapping method names to patchable slots

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::error::PatchError;
use crate::method::{Method, Original};
use crate::patch::Patch;
use crate::slot::Slot;

/// A set of methods sharing one signature, looked up by name
///
/// A table shared between many receivers plays the part of a prototype: patching a name affects every
/// receiver dispatched through the table, and each call still sees its own receiver.
pub struct MethodTable<R, A, T> {
    /// Slots by method name
    slots: RwLock<HashMap<String, Slot<R, A, T>>>,
}

impl<R, A, T> MethodTable<R, A, T> {
    /// Creates an empty table
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a method, builder style
    pub fn with<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&R, A) -> T + Send + Sync + 'static,
    {
        self.insert(name, Method::new(f));
        self
    }

    /// Assigns `method` to `name`.
    ///
    /// An existing slot is overwritten in place, discarding any active patch on it.
    pub fn insert(&self, name: &str, method: Method<R, A, T>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots.get(name) {
            Some(slot) => slot.set(method),
            None => {
                slots.insert(name.to_string(), Slot::new(name, method));
            }
        }
    }

    /// The slot backing `name`, if the name was ever assigned or patched
    pub fn slot(&self, name: &str) -> Option<Slot<R, A, T>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// The slot backing `name`, creating an empty one if needed
    fn slot_or_empty(&self, name: &str) -> Slot<R, A, T> {
        if let Some(slot) = self.slot(name) {
            return slot;
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Slot::empty(name))
            .clone()
    }

    /// The method currently installed at `name`
    pub fn get(&self, name: &str) -> Option<Method<R, A, T>> {
        self.slot(name).and_then(|slot| slot.get())
    }

    /// Returns true if `name` holds a callable method
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names holding a callable method, sorted
    pub fn names(&self) -> Vec<String> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = slots
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Calls the method at `name` on `receiver`
    pub fn call(&self, name: &str, receiver: &R, args: A) -> Result<T, PatchError> {
        match self.slot(name) {
            Some(slot) => slot.call(receiver, args),
            None => Err(PatchError::NotCallable { name: name.into() }),
        }
    }

    /// Returns true if `name` has an active patch
    pub fn is_patched(&self, name: &str) -> bool {
        self.slot(name).map_or(false, |slot| slot.is_patched())
    }

    /// Reverses the active patch at `name`, restoring and returning its original
    pub fn unpatch(&self, name: &str) -> Result<Option<Method<R, A, T>>, PatchError> {
        match self.slot(name) {
            Some(slot) => slot.unpatch(),
            None => Err(PatchError::NotPatched { name: name.into() }),
        }
    }
}

impl<R, A, T> MethodTable<R, A, T>
where
    R: Send + Sync + 'static,
    A: 'static,
    T: 'static,
{
    /// Intercepts the method at `name` with `handler`.
    ///
    /// See [`Slot::patch`]. Patching a name that holds nothing installs the wrapper anyway, and the
    /// handler's original fails with [`PatchError::NotCallable`] when called.
    pub fn patch<H>(&self, name: &str, handler: H, context: Option<R>) -> Patch<R, A, T>
    where
        H: for<'a> Fn(&'a R, Original<'a, R, A, T>, A) -> T + Send + Sync + 'static,
    {
        self.slot_or_empty(name).patch(handler, context)
    }
}

impl<R, A, T> Default for MethodTable<R, A, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, A, T> fmt::Debug for MethodTable<R, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map().entries(slots.iter()).finish()
    }
}

/// Replaces `owner[name]` with a wrapper that calls `handler`.
///
/// The handler gets the receiver, the previous method bound to that receiver, and the call's arguments.
/// If `context` is given, it is the receiver of every call. The returned [`Patch`] holds the previous
/// method and reverts the interception; [`MethodTable::unpatch`] does the same by name.
///
/// Patching an already patched name replaces that patch rather than stacking on top of it.
pub fn monkeypatch<R, A, T, H>(
    owner: &MethodTable<R, A, T>,
    name: &str,
    handler: H,
    context: Option<R>,
) -> Patch<R, A, T>
where
    R: Send + Sync + 'static,
    A: 'static,
    T: 'static,
    H: for<'a> Fn(&'a R, Original<'a, R, A, T>, A) -> T + Send + Sync + 'static,
{
    owner.patch(name, handler, context)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use lazy_static::lazy_static;

    use super::{monkeypatch, MethodTable};
    use crate::error::PatchError;

    /// Instance type dispatching through shared tables
    struct Test {
        name: String,
    }
    impl Test {
        fn new() -> Self {
            Self {
                name: "this is test".to_string(),
            }
        }
        fn incr(&self, v: i64) -> i64 {
            INCR_PROTOTYPE.call("incr", self, v).unwrap()
        }
        fn get_name(&self) -> String {
            NAME_PROTOTYPE.call("getName", self, ()).unwrap()
        }
    }

    lazy_static! {
        static ref INCR_PROTOTYPE: MethodTable<Test, i64, i64> =
            MethodTable::<Test, i64, i64>::new().with("incr", |_, v| v + 1);
        static ref NAME_PROTOTYPE: MethodTable<Test, (), String> =
            MethodTable::<Test, (), String>::new().with("getName", |this, ()| this.name.clone());
    }

    /// Result of a callback-style stat
    #[derive(Debug)]
    struct Stat {
        len: u64,
        patched: bool,
    }

    /// Completion callback for [`Stat`]
    type StatCallback = Box<dyn FnOnce(io::Result<Stat>) + Send>;

    /// Table with a `now` clock returning a fixed value, and a counter of calls to it
    fn clock() -> (MethodTable<(), (), u64>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let table = MethodTable::<(), (), u64>::new().with("now", move |_, ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            11111
        });
        (table, calls)
    }

    /// Table with an asynchronous `stat` which completes on another thread
    fn filesystem() -> MethodTable<(), (PathBuf, StatCallback), ()> {
        MethodTable::<(), (PathBuf, StatCallback), ()>::new().with("stat", |_, (path, callback)| {
            thread::spawn(move || {
                let stat = fs::metadata(path).map(|meta| Stat {
                    len: meta.len(),
                    patched: false,
                });
                callback(stat);
            });
        })
    }

    /// Stats this crate's manifest and waits for the callback
    fn stat_manifest(table: &MethodTable<(), (PathBuf, StatCallback), ()>) -> Stat {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let (tx, rx) = mpsc::channel();
        let callback: StatCallback = Box::new(move |stat| {
            tx.send(stat).unwrap();
        });
        table.call("stat", &(), (path, callback)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap()
    }

    #[test]
    /// The wrapper's value is returned and the original runs once
    fn test_patching() {
        let (table, calls) = clock();
        let original = table.get("now").unwrap();

        let patch = monkeypatch(
            &table,
            "now",
            |_, original, ()| {
                original.call(()).unwrap();
                12345
            },
            None,
        );
        assert!(patch.original().unwrap().ptr_eq(&original));

        assert_eq!(table.call("now", &(), ()), Ok(12345));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    /// Repatching replaces the first patch and still calls the original once
    fn test_repatching() {
        let (table, calls) = clock();
        monkeypatch(
            &table,
            "now",
            |_, original, ()| {
                original.call(()).unwrap();
                12345
            },
            None,
        );
        monkeypatch(
            &table,
            "now",
            |_, original, ()| {
                original.call(()).unwrap();
                13579
            },
            None,
        );

        assert_eq!(table.call("now", &(), ()), Ok(13579));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    /// Unpatching by name restores the original, and unpatched methods can be patched again
    fn test_unpatching() {
        let (table, _) = clock();
        let original = table.get("now").unwrap();
        monkeypatch(&table, "now", |_, _, ()| 12345, None);

        let restored = table.unpatch("now").unwrap().unwrap();
        assert!(restored.ptr_eq(&original));
        assert!(table.get("now").unwrap().ptr_eq(&original));
        assert_eq!(table.call("now", &(), ()), Ok(11111));
        assert!(!table.is_patched("now"));

        monkeypatch(&table, "now", |_, _, ()| 13579, None);
        assert_eq!(table.call("now", &(), ()), Ok(13579));

        // chained patches unwind in a single step
        monkeypatch(&table, "now", |_, _, ()| 24680, None);
        table.unpatch("now").unwrap();
        assert_eq!(table.call("now", &(), ()), Ok(11111));
        assert!(matches!(
            table.unpatch("now"),
            Err(PatchError::NotPatched { .. })
        ));
    }

    #[test]
    /// Patching a shared table affects every instance, and unpatching restores them
    fn test_prototype_patching() {
        let instance = Test::new();
        assert_eq!(instance.incr(3), 4);

        let patch = INCR_PROTOTYPE.patch("incr", |_, _, v| v + 2, None);
        assert_eq!(instance.incr(3), 5);
        assert_eq!(Test::new().incr(3), 5);

        patch.unpatch().unwrap();
        assert_eq!(instance.incr(3), 4);
    }

    #[test]
    /// Handler and original see the instance the method was called on
    fn test_calling_context() {
        let instance = Test::new();
        let other = Test {
            name: "other".to_string(),
        };

        NAME_PROTOTYPE.patch(
            "getName",
            |_, original, ()| format!("{} ABC", original.call(()).unwrap()),
            None,
        );
        assert_eq!(instance.get_name(), "this is test ABC");
        assert_eq!(other.get_name(), "other ABC");

        NAME_PROTOTYPE.unpatch("getName").unwrap();
        assert_eq!(instance.get_name(), "this is test");
    }

    #[test]
    /// A fixed context is used as the receiver regardless of the call site
    fn test_fixed_context() {
        let table = MethodTable::<String, (), String>::new()
            .with("describe", |this: &String, ()| format!("I am {}", this));

        let patch = table.patch(
            "describe",
            |this, original, ()| format!("{} (via {})", original.call(()).unwrap(), this),
            Some("context".to_string()),
        );

        let expected = "I am context (via context)".to_string();
        assert_eq!(table.call("describe", &"first".to_string(), ()), Ok(expected.clone()));
        assert_eq!(table.call("describe", &"second".to_string(), ()), Ok(expected));

        patch.unpatch().unwrap();
        assert_eq!(
            table.call("describe", &"first".to_string(), ()),
            Ok("I am first".to_string())
        );
    }

    #[test]
    /// A callback-style original can have its result modified
    fn test_async() {
        let table = filesystem();
        let unpatched = stat_manifest(&table);
        assert!(!unpatched.patched);

        monkeypatch(
            &table,
            "stat",
            |_, original, (path, callback): (PathBuf, StatCallback)| {
                let callback: StatCallback = Box::new(move |stat| {
                    callback(stat.map(|stat| Stat {
                        patched: true,
                        ..stat
                    }))
                });
                original.call((path, callback)).unwrap()
            },
            None,
        );
        let patched = stat_manifest(&table);
        assert!(patched.patched);
        assert_eq!(patched.len, unpatched.len);

        table.unpatch("stat").unwrap();
        assert!(!stat_manifest(&table).patched);
    }

    #[test]
    /// Absent names can be patched, and are absent again once restored
    fn test_absent_method() {
        let table = MethodTable::<(), (), Result<u32, PatchError>>::new();
        assert!(!table.contains("missing"));
        assert!(matches!(
            table.call("missing", &(), ()),
            Err(PatchError::NotCallable { .. })
        ));

        let patch = monkeypatch(&table, "missing", |_, original, ()| original.call(())?, None);
        assert!(patch.original().is_none());
        assert!(table.contains("missing"));
        assert_eq!(table.names(), vec!["missing".to_string()]);
        assert_eq!(
            table.call("missing", &(), ()),
            Ok(Err(PatchError::NotCallable {
                name: "missing".into()
            }))
        );

        assert!(table.unpatch("missing").unwrap().is_none());
        assert!(!table.contains("missing"));
        assert!(table.names().is_empty());
    }

    #[test]
    /// Inserting over a patched name keeps the same slot and discards the patch
    fn test_insert_over_patch() {
        let (table, _) = clock();
        let slot = table.slot("now").unwrap();
        let patch = table.patch("now", |_, _, ()| 12345, None);

        table.insert("now", crate::Method::new(|_, ()| 99));
        assert!(!patch.is_active());
        assert_eq!(slot.call(&(), ()), Ok(99));
        assert_eq!(table.call("now", &(), ()), Ok(99));
    }
}
