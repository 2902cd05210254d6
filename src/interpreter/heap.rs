use super::types::{ContextId, ExecutionContext, ObjectData};
use crate::completion::Completion;
use crate::internal_error;
use crate::types::JsObject;
use futures::future::LocalBoxFuture;

/// Object arena. Objects are never freed; `allocated_objects` is the hook an
/// external collector would cooperate through.
#[derive(Default)]
pub(crate) struct Heap {
    objects: Vec<ObjectData>,
}

impl Heap {
    pub(crate) fn allocate(&mut self, data: ObjectData) -> JsObject {
        let id = self.objects.len() as u64;
        self.objects.push(data);
        JsObject { id }
    }

    pub(crate) fn get(&self, obj: JsObject) -> &ObjectData {
        match self.objects.get(obj.id as usize) {
            Some(data) => data,
            None => internal_error!("dangling object handle {}", obj.id),
        }
    }

    pub(crate) fn get_mut(&mut self, obj: JsObject) -> &mut ObjectData {
        match self.objects.get_mut(obj.id as usize) {
            Some(data) => data,
            None => internal_error!("dangling object handle {}", obj.id),
        }
    }

    pub(crate) fn allocated_objects(&self) -> usize {
        self.objects.len()
    }
}

struct Slot {
    generation: u32,
    context: Option<ExecutionContext>,
}

/// Execution contexts plus the stack of those currently running. Released
/// slots go on a free list and come back with a bumped generation.
#[derive(Default)]
pub(crate) struct ContextArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    stack: Vec<ContextId>,
}

impl ContextArena {
    pub(crate) fn insert(&mut self, context: ExecutionContext) -> ContextId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.context = Some(context);
            return ContextId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            context: Some(context),
        });
        ContextId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    fn slot(&self, id: ContextId) -> Option<&ExecutionContext> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.context.as_ref())
    }

    pub(crate) fn get(&self, id: ContextId) -> &ExecutionContext {
        match self.slot(id) {
            Some(ctx) => ctx,
            None => internal_error!("execution context {id} was released"),
        }
    }

    pub(crate) fn get_mut(&mut self, id: ContextId) -> &mut ExecutionContext {
        match self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.context.as_mut())
        {
            Some(ctx) => ctx,
            None => internal_error!("execution context {id} was released"),
        }
    }

    pub(crate) fn contains(&self, id: ContextId) -> bool {
        self.slot(id).is_some()
    }

    pub(crate) fn release(&mut self, id: ContextId) {
        if self.stack.contains(&id) {
            internal_error!("releasing execution context {id} while it is on the stack");
        }
        let Some(slot) = self.slots.get_mut(id.index) else {
            return;
        };
        if slot.generation == id.generation && slot.context.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
    }

    /// Number of slots ever created, occupied or free.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Remove every stored suspended computation, leaving the contexts in place.
    pub(crate) fn take_suspended(&mut self) -> Vec<LocalBoxFuture<'static, Completion>> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.context.as_mut()?.code_evaluation_state.take())
            .collect()
    }

    pub(crate) fn push(&mut self, id: ContextId) {
        if self.stack.contains(&id) {
            internal_error!("execution context {id} is already on the stack");
        }
        self.stack.push(id);
    }

    pub(crate) fn pop(&mut self, id: ContextId) {
        match self.stack.pop() {
            Some(top) if top == id => {}
            Some(top) => internal_error!("popped context {top}, expected {id}"),
            None => internal_error!("popped context {id} from an empty stack"),
        }
    }

    pub(crate) fn running(&self) -> Option<ContextId> {
        self.stack.last().copied()
    }

    pub(crate) fn stack(&self) -> &[ContextId] {
        &self.stack
    }
}
