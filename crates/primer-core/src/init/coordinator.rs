//! Type initialization slow path
//!
//! Follows the JVM class initialization procedure (JVMS §5.5), with the
//! step numbers noted where they apply.

use crate::init::invoker::invoke_initializer;
use crate::init::record::Acquire;
use crate::init::{mark_type_reached, InitError, InitRecord, InitState};
use crate::scheduler;
use crate::types::RuntimeType;

/// Initialize `hub` if it is not initialized yet.
///
/// Safe to call from any number of threads and tasks at once; the
/// initializer runs at most once. A caller that is itself running `hub`'s
/// initializer returns immediately. Once a type has failed to initialize,
/// every later call fails with [`InitError::PreviouslyFailed`].
///
/// This is the slow path; [`RuntimeType::ensure_initialized`] checks
/// [`InitRecord::requires_slow_path`] first.
pub fn ensure_initialized(hub: &RuntimeType) -> Result<(), InitError> {
    let info = hub.init_record();

    // Initializers anywhere in the hierarchy may inspect reachability, so
    // mark it before anything runs.
    mark_type_reached(hub);

    if info.is_initialized() {
        return Ok(());
    }

    if !hub.is_loaded() {
        hub.define();
        tracing::debug!(type_name = hub.name(), "defined type on first initialization");
    }

    let carrier = scheduler::current_carrier();

    // Steps 1-6: take the lock, wait for other initializers, claim ownership
    match info.acquire(carrier) {
        Acquire::Proceed => {}
        Acquire::Reentrant | Acquire::Initialized => return Ok(()),
        Acquire::Erroneous => {
            return Err(InitError::PreviouslyFailed {
                type_name: hub.name().to_string(),
            })
        }
    }

    tracing::debug!(type_name = hub.name(), carrier = carrier.as_u64(), "initializing type");

    // A task must finish initialization on the carrier recorded above: on
    // another carrier the reentrancy check would no longer recognize it, and
    // a different task scheduled onto this carrier would be taken for it.
    let _pin = scheduler::pin();
    let unwind_guard = FailOnUnwind { info };
    let result = do_initialize(info, hub);
    unwind_guard.disarm();
    result
}

fn do_initialize(info: &InitRecord, hub: &RuntimeType) -> Result<(), InitError> {
    // Step 7: superclass first, then superinterfaces with default methods
    if !hub.is_interface() {
        if let Err(error) = initialize_supertypes(hub) {
            tracing::debug!(type_name = hub.name(), %error, "supertype initialization failed");
            info.set_state_and_notify(InitState::InitializationError);
            return Err(error);
        }
    }

    // Step 9
    match invoke_initializer(info, hub) {
        Ok(()) => {
            // Step 10
            info.set_state_and_notify(InitState::FullyInitialized);
            tracing::debug!(type_name = hub.name(), "type initialized");
            Ok(())
        }
        Err(thrown) => {
            // Steps 11-12
            let error = thrown.into_init_error(hub.name());
            tracing::warn!(type_name = hub.name(), %error, "type initializer failed");
            info.set_state_and_notify(InitState::InitializationError);
            Err(error)
        }
    }
}

fn initialize_supertypes(hub: &RuntimeType) -> Result<(), InitError> {
    if let Some(super_type) = hub.super_type() {
        super_type.ensure_initialized()?;
    }
    // has_default_methods covers declared and inherited ones
    if hub.has_default_methods() {
        initialize_super_interfaces(hub)?;
    }
    Ok(())
}

/// Depth first, so the top of the interface hierarchy initializes first.
/// Only interfaces that declare a default method are initialized themselves.
fn initialize_super_interfaces(hub: &RuntimeType) -> Result<(), InitError> {
    debug_assert!(hub.has_default_methods(), "caller should have checked this");
    for iface in hub.interfaces() {
        if iface.has_default_methods() {
            initialize_super_interfaces(iface)?;
        }
        if iface.declares_default_methods() {
            iface.ensure_initialized()?;
        }
    }
    Ok(())
}

/// Moves the record to the error state if an initializer panics, so threads
/// waiting on it are released instead of blocking forever.
struct FailOnUnwind<'a> {
    info: &'a InitRecord,
}

impl FailOnUnwind<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for FailOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.info.set_state_and_notify(InitState::InitializationError);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::{InitializerHandle, Thrown, TypeReached};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_initializer_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let hub = RuntimeType::builder("Once")
            .initializer(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();

        ensure_initialized(&hub).unwrap();
        ensure_initialized(&hub).unwrap();
        hub.ensure_initialized().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hub.init_record().is_initialized());
        assert!(!hub.init_record().requires_slow_path());
    }

    #[test]
    fn test_type_without_initializer_still_transitions() {
        let hub = RuntimeType::builder("Empty").build().unwrap();
        assert!(hub.init_record().is_linked());

        ensure_initialized(&hub).unwrap();
        assert!(hub.init_record().is_initialized());
        assert_eq!(hub.init_record().type_reached(), TypeReached::Reached);
    }

    #[test]
    fn test_superclass_initialized_first() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let base = RuntimeType::builder("Base")
            .initializer(move || {
                o.lock().push("Base");
                Ok(())
            })
            .build()
            .unwrap();

        let o = order.clone();
        let b = base.clone();
        let derived = RuntimeType::builder("Derived")
            .extends(&base)
            .initializer(move || {
                assert!(b.init_record().is_initialized());
                o.lock().push("Derived");
                Ok(())
            })
            .build()
            .unwrap();

        ensure_initialized(&derived).unwrap();
        assert_eq!(*order.lock(), vec!["Base", "Derived"]);
    }

    #[test]
    fn test_interface_does_not_initialize_superinterfaces() {
        let parent = RuntimeType::builder("Parent")
            .interface()
            .declares_default_methods()
            .build()
            .unwrap();
        let child = RuntimeType::builder("Child")
            .interface()
            .implements(&parent)
            .declares_default_methods()
            .build()
            .unwrap();

        ensure_initialized(&child).unwrap();
        assert!(child.init_record().is_initialized());
        assert!(parent.init_record().is_linked());
    }

    #[test]
    fn test_only_declaring_interfaces_initialized() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let top = RuntimeType::builder("Top")
            .interface()
            .declares_default_methods()
            .initializer(move || {
                o.lock().push("Top");
                Ok(())
            })
            .build()
            .unwrap();
        // Inherits default methods but declares none
        let o = order.clone();
        let middle = RuntimeType::builder("Middle")
            .interface()
            .implements(&top)
            .initializer(move || {
                o.lock().push("Middle");
                Ok(())
            })
            .build()
            .unwrap();
        let o = order.clone();
        let class = RuntimeType::builder("Concrete")
            .implements(&middle)
            .initializer(move || {
                o.lock().push("Concrete");
                Ok(())
            })
            .build()
            .unwrap();

        assert!(middle.has_default_methods());
        assert!(!middle.declares_default_methods());

        ensure_initialized(&class).unwrap();
        assert_eq!(*order.lock(), vec!["Top", "Concrete"]);
        assert!(middle.init_record().is_linked());
    }

    fn recording(
        builder: crate::types::TypeBuilder,
        name: &'static str,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<RuntimeType> {
        let o = order.clone();
        builder
            .initializer(move || {
                o.lock().push(name);
                Ok(())
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_declaring_superinterfaces_initialized_depth_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let top = recording(
            RuntimeType::builder("Top").interface().declares_default_methods(),
            "Top",
            &order,
        );
        let mid = recording(
            RuntimeType::builder("Mid")
                .interface()
                .implements(&top)
                .declares_default_methods(),
            "Mid",
            &order,
        );
        let class = recording(RuntimeType::builder("Leaf").implements(&mid), "Leaf", &order);

        ensure_initialized(&class).unwrap();
        assert_eq!(*order.lock(), vec!["Top", "Mid", "Leaf"]);
        assert!(top.init_record().is_initialized());
        assert!(mid.init_record().is_initialized());
    }

    #[test]
    fn test_superclass_before_default_method_interfaces() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let base = recording(RuntimeType::builder("Base"), "Base", &order);
        let iface = recording(
            RuntimeType::builder("Greeter").interface().declares_default_methods(),
            "Greeter",
            &order,
        );
        let class = recording(
            RuntimeType::builder("Impl").extends(&base).implements(&iface),
            "Impl",
            &order,
        );

        ensure_initialized(&class).unwrap();
        assert_eq!(*order.lock(), vec!["Base", "Greeter", "Impl"]);
    }

    #[test]
    fn test_interfaces_without_default_methods_skipped() {
        let marker = RuntimeType::builder("Marker").interface().build().unwrap();
        let class = RuntimeType::builder("Tagged").implements(&marker).build().unwrap();

        ensure_initialized(&class).unwrap();
        assert!(marker.init_record().is_linked());
        // Still marked reached
        assert!(marker.init_record().is_type_reached());
    }

    #[test]
    fn test_initializer_error_wrapped_then_previously_failed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let hub = RuntimeType::builder("Broken")
            .initializer(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Thrown::exception("config missing"))
            })
            .build()
            .unwrap();

        let first = ensure_initialized(&hub).unwrap_err();
        assert!(matches!(first, InitError::ExceptionInInitializer { .. }));
        assert_eq!(first.to_string(), "Exception in initializer of type Broken: config missing");

        let second = ensure_initialized(&hub).unwrap_err();
        assert!(matches!(
            second,
            InitError::PreviouslyFailed { ref type_name } if type_name == "Broken"
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hub.init_record().is_in_error_state());
        assert!(hub.init_record().requires_slow_path());
    }

    #[test]
    fn test_unrecoverable_error_not_wrapped() {
        let hub = RuntimeType::builder("Exhausted")
            .initializer(|| Err(Thrown::unrecoverable("stack overflow")))
            .build()
            .unwrap();

        let err = ensure_initialized(&hub).unwrap_err();
        assert!(matches!(err, InitError::Unrecoverable(ref m) if m == "stack overflow"));
        assert!(hub.init_record().is_in_error_state());
    }

    #[test]
    fn test_superclass_failure_poisons_subclass() {
        let base = RuntimeType::builder("BadBase")
            .initializer(|| Err(Thrown::exception("nope")))
            .build()
            .unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        let derived = RuntimeType::builder("GoodDerived")
            .extends(&base)
            .initializer(move || {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();

        // The base failure propagates unchanged through the subclass
        let err = ensure_initialized(&derived).unwrap_err();
        assert!(matches!(
            err,
            InitError::ExceptionInInitializer { ref type_name, .. } if type_name == "BadBase"
        ));
        assert!(derived.init_record().is_in_error_state());
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let err = ensure_initialized(&derived).unwrap_err();
        assert!(matches!(
            err,
            InitError::PreviouslyFailed { ref type_name } if type_name == "GoodDerived"
        ));
    }

    #[test]
    fn test_direct_reentrancy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<RuntimeType>>>> = Arc::new(Mutex::new(None));

        let c = calls.clone();
        let s = slot.clone();
        let hub = RuntimeType::builder("SelfRef")
            .initializer(move || {
                c.fetch_add(1, Ordering::SeqCst);
                let me = s.lock().clone().expect("type installed");
                // Recursive request from the initializing thread
                ensure_initialized(&me)?;
                assert!(me.init_record().is_being_initialized());
                Ok(())
            })
            .build()
            .unwrap();
        *slot.lock() = Some(hub.clone());

        ensure_initialized(&hub).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hub.init_record().is_initialized());
    }

    #[test]
    fn test_nested_failure_in_initializer_propagates() {
        let dependency = RuntimeType::builder("Dependency")
            .initializer(|| Err(Thrown::exception("bad dependency")))
            .build()
            .unwrap();
        let d = dependency.clone();
        let user = RuntimeType::builder("User")
            .initializer(move || {
                d.ensure_initialized()?;
                Ok(())
            })
            .build()
            .unwrap();

        let err = ensure_initialized(&user).unwrap_err();
        // Already classified, so not wrapped a second time
        assert!(matches!(
            err,
            InitError::ExceptionInInitializer { ref type_name, .. } if type_name == "Dependency"
        ));
        assert!(user.init_record().is_in_error_state());
    }

    #[test]
    fn test_prebuilt_failed_record() {
        let hub = RuntimeType::builder("KnownBad")
            .record(InitRecord::failed(true))
            .build()
            .unwrap();
        let err = ensure_initialized(&hub).unwrap_err();
        assert!(matches!(err, InitError::PreviouslyFailed { .. }));
        assert!(hub.init_record().is_type_reached());
    }

    #[test]
    fn test_unloaded_type_defined() {
        let hub = RuntimeType::builder("Lazy").unloaded().build().unwrap();
        assert!(!hub.is_loaded());
        ensure_initialized(&hub).unwrap();
        assert!(hub.is_loaded());
    }

    #[test]
    fn test_panicking_initializer_fails_type() {
        let hub = RuntimeType::builder("Panics")
            .initializer(|| panic!("initializer blew up"))
            .build()
            .unwrap();

        let h = hub.clone();
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || ensure_initialized(&h)));
        assert!(outcome.is_err());

        assert!(hub.init_record().is_in_error_state());
        assert!(matches!(
            ensure_initialized(&hub),
            Err(InitError::PreviouslyFailed { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "No initializer entry point for type Corrupt")]
    fn test_unresolved_initializer_is_fatal() {
        let hub = RuntimeType::builder("Corrupt")
            .record(InitRecord::new(Some(InitializerHandle::unresolved()), true))
            .build()
            .unwrap();
        let _ = ensure_initialized(&hub);
    }
}
