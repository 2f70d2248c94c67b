//! Per-type initialization record
//!
//! The record is kept apart from [`RuntimeType`](crate::types::RuntimeType)
//! because type metadata is immutable once built while the init state is
//! not, and because most types never need run-time initialization: those
//! share a handful of prebuilt, read-only records.
//!
//! The `reached` flag of every supertype and superinterface must be at
//! least as high as the type's own, in the order
//! `NotReached < Reached < Untracked`: a `Reached` type only has `Reached`
//! or `Untracked` ancestors, and an `Untracked` type only `Untracked` ones.
//! The type builder rejects hierarchies that break this rule.

use crate::init::InitializerHandle;
use crate::scheduler::CarrierId;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{fence, AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Initialization state of a type
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InitState {
    /// Linked but not initialized yet
    Linked = 0,
    /// An initializer is running
    BeingInitialized = 1,
    /// Initialized (successful final state)
    FullyInitialized = 2,
    /// Initialization failed (final state)
    InitializationError = 3,
}

impl InitState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => InitState::Linked,
            1 => InitState::BeingInitialized,
            2 => InitState::FullyInitialized,
            _ => InitState::InitializationError,
        }
    }
}

/// Whether a type has been reached at run time
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TypeReached {
    /// Tracked, not reached yet
    NotReached = 0,
    /// Tracked and reached
    Reached = 1,
    /// Never tracked; checks for this type were resolved ahead of time
    Untracked = 2,
}

impl TypeReached {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TypeReached::NotReached,
            1 => TypeReached::Reached,
            _ => TypeReached::Untracked,
        }
    }

    fn for_tracking(tracked: bool) -> Self {
        if tracked {
            TypeReached::NotReached
        } else {
            TypeReached::Untracked
        }
    }
}

/// Errors from build-time record updates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Reachability of untracked records is fixed
    #[error("Cannot mark an untracked type as reached")]
    Untracked,
}

/// Outcome of taking the record lock at the start of initialization
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Acquire {
    /// The caller now owns initialization
    Proceed,
    /// The caller is already running this type's initializer
    Reentrant,
    /// Another caller finished initialization
    Initialized,
    /// Initialization failed earlier
    Erroneous,
}

/// Fields guarded by the record lock
#[derive(Debug, Default)]
struct LockState {
    /// Carrier running the initializer, while `BeingInitialized`
    init_thread: Option<CarrierId>,

    /// Allocated on first contention, dropped after the final notify
    condition: Option<Arc<Condvar>>,
}

// Shared records for build-time initialized types that are not tracked
static NO_INITIALIZER_NO_TRACKING: Lazy<Arc<InitRecord>> =
    Lazy::new(|| Arc::new(InitRecord::prebuilt(InitState::FullyInitialized, false, true, false)));
static INITIALIZED_NO_TRACKING: Lazy<Arc<InitRecord>> =
    Lazy::new(|| Arc::new(InitRecord::prebuilt(InitState::FullyInitialized, true, true, false)));
static FAILED_NO_TRACKING: Lazy<Arc<InitRecord>> =
    Lazy::new(|| {
        Arc::new(InitRecord::prebuilt(
            InitState::InitializationError,
            true,
            false,
            false,
        ))
    });

/// Run-time initialization state of one type
///
/// `state` and `reached` are atomics so the fast path and the reachability
/// walk can read them without the lock; `state` is only written with the
/// lock held. Both use sequentially consistent accesses: the walk stores
/// `reached` then loads `state`, the commit stores `state` then loads
/// `reached`, and one of them must see the other's store to clear
/// `slow_path_required`.
pub struct InitRecord {
    /// Initializer routine, or None if the type has none
    initializer: Option<InitializerHandle>,

    reached: AtomicU8,

    state: AtomicU8,

    /// Cached "fast path cannot skip this type"
    slow_path_required: AtomicBool,

    /// Absent for records created fully initialized; those never change
    init_lock: Option<Mutex<LockState>>,

    /// The type declares an initializer, whether or not it runs at run time
    has_initializer: bool,

    build_time_initialized: bool,
}

impl InitRecord {
    fn prebuilt(
        state: InitState,
        has_initializer: bool,
        build_time_initialized: bool,
        tracked: bool,
    ) -> Self {
        let reached = TypeReached::for_tracking(tracked);
        Self {
            initializer: None,
            reached: AtomicU8::new(reached as u8),
            state: AtomicU8::new(state as u8),
            slow_path_required: AtomicBool::new(
                reached != TypeReached::Untracked || state != InitState::FullyInitialized,
            ),
            init_lock: (state != InitState::FullyInitialized)
                .then(|| Mutex::new(LockState::default())),
            has_initializer,
            build_time_initialized,
        }
    }

    /// Record for a type initialized ahead of time that has no initializer
    pub fn no_initializer(tracked: bool) -> Arc<Self> {
        if tracked {
            Arc::new(Self::prebuilt(InitState::FullyInitialized, false, true, true))
        } else {
            NO_INITIALIZER_NO_TRACKING.clone()
        }
    }

    /// Record for a type initialized ahead of time whose initializer already ran
    pub fn initialized(tracked: bool) -> Arc<Self> {
        if tracked {
            Arc::new(Self::prebuilt(InitState::FullyInitialized, true, true, true))
        } else {
            INITIALIZED_NO_TRACKING.clone()
        }
    }

    /// Record for a type whose initialization is known to have failed
    pub fn failed(tracked: bool) -> Arc<Self> {
        if tracked {
            Arc::new(Self::prebuilt(InitState::InitializationError, true, false, true))
        } else {
            FAILED_NO_TRACKING.clone()
        }
    }

    /// Record for a linked type that still needs run-time initialization
    pub fn new(initializer: Option<InitializerHandle>, tracked: bool) -> Arc<Self> {
        let has_initializer = initializer.is_some();
        Arc::new(Self {
            initializer,
            reached: AtomicU8::new(TypeReached::for_tracking(tracked) as u8),
            state: AtomicU8::new(InitState::Linked as u8),
            slow_path_required: AtomicBool::new(true),
            init_lock: Some(Mutex::new(LockState::default())),
            has_initializer,
            build_time_initialized: false,
        })
    }

    /// Record for a type defined at run time.
    ///
    /// Such types are treated as declaring an initializer, but no handle is
    /// linked for them, so the initializer step does nothing.
    // TODO: split Linked into Loaded/Linked once run-time defined types are
    // verified and linked lazily.
    pub fn for_runtime_defined(tracked: bool) -> Arc<Self> {
        Arc::new(Self {
            initializer: None,
            reached: AtomicU8::new(TypeReached::for_tracking(tracked) as u8),
            state: AtomicU8::new(InitState::Linked as u8),
            slow_path_required: AtomicBool::new(true),
            init_lock: Some(Mutex::new(LockState::default())),
            has_initializer: true,
            build_time_initialized: false,
        })
    }

    /// Mark a tracked record reached before it is published.
    ///
    /// Meant for the image builder; at run time use
    /// [`mark_type_reached`](crate::init::mark_type_reached), which also
    /// covers the hierarchy.
    pub fn set_type_reached(&self) -> Result<(), RecordError> {
        if !self.is_tracked() {
            return Err(RecordError::Untracked);
        }
        self.reached.store(TypeReached::Reached as u8, Ordering::SeqCst);
        self.slow_path_required
            .store(self.state() != InitState::FullyInitialized, Ordering::Release);
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Current reachability
    pub fn type_reached(&self) -> TypeReached {
        TypeReached::from_u8(self.reached.load(Ordering::SeqCst))
    }

    /// Whether the fast path has to call into the coordinator
    pub fn requires_slow_path(&self) -> bool {
        self.slow_path_required.load(Ordering::Acquire)
    }

    /// Whether a tracked type has been reached
    pub fn is_type_reached(&self) -> bool {
        debug_assert!(
            self.is_tracked(),
            "reachability of untracked types is never checked at run time"
        );
        self.type_reached() == TypeReached::Reached
    }

    /// Whether the type declares an initializer
    pub fn has_initializer(&self) -> bool {
        self.has_initializer
    }

    /// The initializer handle, if one was linked
    pub fn initializer(&self) -> Option<&InitializerHandle> {
        self.initializer.as_ref()
    }

    /// Whether initialization happened ahead of time
    pub fn is_build_time_initialized(&self) -> bool {
        self.build_time_initialized
    }

    /// Successfully initialized
    pub fn is_initialized(&self) -> bool {
        self.state() == InitState::FullyInitialized
    }

    /// Initialization failed
    pub fn is_in_error_state(&self) -> bool {
        self.state() == InitState::InitializationError
    }

    /// Linked, initialization not started
    pub fn is_linked(&self) -> bool {
        self.state() == InitState::Linked
    }

    /// Initializer running
    pub fn is_being_initialized(&self) -> bool {
        self.state() == InitState::BeingInitialized
    }

    /// Whether reachability is tracked for this type
    pub fn is_tracked(&self) -> bool {
        self.type_reached() != TypeReached::Untracked
    }

    pub(crate) fn is_type_reached_or_untracked(&self) -> bool {
        self.type_reached() != TypeReached::NotReached
    }

    /// Move `NotReached` to `Reached`; a no-op for other values.
    ///
    /// Runs without the lock and may race with itself: the only transition
    /// it makes is the forward one, so racing writers agree.
    pub(crate) fn mark_reached(&self) {
        let _ = self.reached.compare_exchange(
            TypeReached::NotReached as u8,
            TypeReached::Reached as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if self.type_reached() == TypeReached::Reached && self.is_initialized() {
            self.slow_path_required.store(false, Ordering::Release);
        }
    }

    /// Take the lock and decide what the caller on `carrier` does next.
    ///
    /// Blocks while another carrier runs the initializer. The wait is not
    /// interruptible and has no timeout.
    pub(crate) fn acquire(&self, carrier: CarrierId) -> Acquire {
        let Some(lock) = self.init_lock.as_ref() else {
            debug_assert!(self.is_initialized());
            return Acquire::Initialized;
        };
        let mut guard = lock.lock();

        while self.is_being_initialized() && guard.init_thread != Some(carrier) {
            // The lock is held, so installing the condition cannot race
            let condition = guard.condition.get_or_insert_with(|| Arc::new(Condvar::new())).clone();
            condition.wait(&mut guard);
        }

        match self.state() {
            InitState::BeingInitialized => Acquire::Reentrant,
            InitState::FullyInitialized => Acquire::Initialized,
            InitState::InitializationError => Acquire::Erroneous,
            InitState::Linked => {
                self.state.store(InitState::BeingInitialized as u8, Ordering::SeqCst);
                guard.init_thread = Some(carrier);
                Acquire::Proceed
            }
        }
    }

    /// Carrier currently running the initializer
    pub fn initializing_thread(&self) -> Option<CarrierId> {
        self.init_lock.as_ref().and_then(|lock| lock.lock().init_thread)
    }

    /// Whether any caller has had to wait on this record
    pub fn has_waiters(&self) -> bool {
        self.init_lock
            .as_ref()
            .map_or(false, |lock| lock.lock().condition.is_some())
    }

    /// Commit a final state and wake every waiter
    pub(crate) fn set_state_and_notify(&self, state: InitState) {
        debug_assert!(matches!(
            state,
            InitState::FullyInitialized | InitState::InitializationError
        ));
        let Some(lock) = self.init_lock.as_ref() else {
            return;
        };
        let mut guard = lock.lock();

        self.state.store(state as u8, Ordering::SeqCst);
        if state == InitState::FullyInitialized && self.type_reached() != TypeReached::NotReached {
            self.slow_path_required.store(false, Ordering::Release);
        }
        guard.init_thread = None;
        // Everything above must be visible to woken waiters
        fence(Ordering::SeqCst);

        if let Some(condition) = guard.condition.take() {
            condition.notify_all();
        }
    }
}

impl std::fmt::Debug for InitRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitRecord")
            .field("state", &self.state())
            .field("reached", &self.type_reached())
            .field("slow_path_required", &self.requires_slow_path())
            .field("has_initializer", &self.has_initializer)
            .field("build_time_initialized", &self.build_time_initialized)
            .finish()
    }
}
