//! Single-flight memoization of compiled encoders.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::context::EncodeContext;
use crate::error::CodecError;
use crate::shape::TypeInfo;

/// Identity of one compiled procedure: the type plus every context setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    type_id: TypeId,
    context: EncodeContext,
}

impl CacheKey {
    pub(crate) fn new(ty: TypeInfo, context: EncodeContext) -> Self {
        Self {
            type_id: ty.id(),
            context,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum GateState {
    Pending,
    Ready,
    Failed,
}

/// One-shot rendezvous between the compiling caller and everyone else.
///
/// The gate remembers which `(type, context)` it stands for, so a holder
/// whose compilation was abandoned can look the procedure up again.
pub(crate) struct Gate<P> {
    ty: TypeInfo,
    context: EncodeContext,
    procedure: OnceCell<P>,
    state: Mutex<GateState>,
    cvar: Condvar,
}

impl<P: Clone> Gate<P> {
    fn new(ty: TypeInfo, context: EncodeContext) -> Self {
        Self {
            ty,
            context,
            procedure: OnceCell::new(),
            state: Mutex::new(GateState::Pending),
            cvar: Condvar::new(),
        }
    }

    pub(crate) fn type_info(&self) -> TypeInfo {
        self.ty
    }

    pub(crate) fn context(&self) -> EncodeContext {
        self.context
    }

    /// Blocks until the procedure is published or compilation is abandoned.
    ///
    /// Once published, the procedure is read without taking the lock.
    pub(crate) fn wait(&self) -> Result<P, CodecError> {
        if let Some(procedure) = self.procedure.get() {
            return Ok(procedure.clone());
        }

        let mut state = self.state.lock();
        loop {
            match *state {
                GateState::Ready => {
                    if let Some(procedure) = self.procedure.get() {
                        return Ok(procedure.clone());
                    }
                }
                GateState::Failed => {
                    return Err(CodecError::CompilationFailed {
                        type_name: self.ty.name(),
                    })
                }
                GateState::Pending => {}
            }
            self.cvar.wait(&mut state);
        }
    }

    fn open(&self, procedure: P) {
        // Published before the state flips, so a `Ready` state always finds it.
        let _ = self.procedure.set(procedure);
        *self.state.lock() = GateState::Ready;
        self.cvar.notify_all();
    }

    fn fail(&self) {
        *self.state.lock() = GateState::Failed;
        self.cvar.notify_all();
    }
}

enum Slot<P> {
    Pending(Arc<Gate<P>>),
    Ready(P),
}

/// Concurrent map from [`CacheKey`] to compiled procedure.
///
/// A miss reserves the slot with a pending gate before compiling. Lookups
/// that land on a pending slot (other threads, or the compiler recursing into
/// the type it is compiling) get a placeholder procedure that waits on the
/// gate when invoked. A placeholder whose gate failed goes back to the cache
/// for the same key instead of failing forever.
pub(crate) struct EncoderCache<P> {
    slots: RwLock<HashMap<CacheKey, Slot<P>>>,
    compilations: Mutex<HashMap<TypeId, usize>>,
    placeholder: fn(Arc<Gate<P>>) -> P,
}

impl<P: Clone> EncoderCache<P> {
    pub(crate) fn new(placeholder: fn(Arc<Gate<P>>) -> P) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            compilations: Mutex::new(HashMap::new()),
            placeholder,
        }
    }

    pub(crate) fn get_or_compile(
        &self,
        ty: TypeInfo,
        context: EncodeContext,
        compile: impl FnOnce() -> P,
    ) -> P {
        let key = CacheKey::new(ty, context);
        if let Some(slot) = self.slots.read().get(&key) {
            return self.materialize(slot);
        }

        let gate = {
            let mut slots = self.slots.write();
            if let Some(slot) = slots.get(&key) {
                return self.materialize(slot);
            }
            let gate = Arc::new(Gate::new(ty, context));
            slots.insert(key, Slot::Pending(Arc::clone(&gate)));
            gate
        };

        debug!(type_name = ty.name(), %context, "compiling encoder");
        *self.compilations.lock().entry(ty.id()).or_default() += 1;

        let mut guard = PendingGuard {
            cache: self,
            key,
            gate: &gate,
            type_name: ty.name(),
            armed: true,
        };
        let procedure = compile();
        self.slots
            .write()
            .insert(key, Slot::Ready(procedure.clone()));
        gate.open(procedure.clone());
        guard.armed = false;

        procedure
    }

    /// Number of compilations started for `ty`, across all contexts.
    pub(crate) fn compilations(&self, ty: TypeInfo) -> usize {
        self.compilations
            .lock()
            .get(&ty.id())
            .copied()
            .unwrap_or_default()
    }

    fn materialize(&self, slot: &Slot<P>) -> P {
        match slot {
            Slot::Ready(procedure) => procedure.clone(),
            Slot::Pending(gate) => (self.placeholder)(Arc::clone(gate)),
        }
    }
}

/// Releases waiters and frees the slot when compilation unwinds.
struct PendingGuard<'a, P: Clone> {
    cache: &'a EncoderCache<P>,
    key: CacheKey,
    gate: &'a Gate<P>,
    type_name: &'static str,
    armed: bool,
}

impl<P: Clone> Drop for PendingGuard<'_, P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(type_name = self.type_name, "encoder compilation aborted");
        self.cache.slots.write().remove(&self.key);
        self.gate.fail();
    }
}
