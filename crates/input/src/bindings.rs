use crate::{InputEvent, InputPayload};
use std::collections::HashMap;

type Callback<C, E> = Box<dyn FnMut(&mut C, &mut E, &InputPayload)>;

/// One callback per input event.
///
/// `C` is the application context and `E` the engine handed to every
/// callback, so handlers never need globals to reach either.
pub struct InputBindings<C, E> {
    callbacks: HashMap<InputEvent, Callback<C, E>>,
}

impl<C, E> Default for InputBindings<C, E> {
    fn default() -> Self {
        Self {
            callbacks: HashMap::new(),
        }
    }
}

impl<C, E> std::fmt::Debug for InputBindings<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBindings")
            .field("events", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C, E> InputBindings<C, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`. Returns true when it replaced an
    /// earlier callback.
    pub fn bind(
        &mut self,
        event: InputEvent,
        callback: impl FnMut(&mut C, &mut E, &InputPayload) + 'static,
    ) -> bool {
        let replaced = self.callbacks.insert(event, Box::new(callback)).is_some();
        if replaced {
            tracing::debug!(?event, "input binding replaced");
        }
        replaced
    }

    pub fn unbind(&mut self, event: InputEvent) -> bool {
        self.callbacks.remove(&event).is_some()
    }

    pub fn is_bound(&self, event: InputEvent) -> bool {
        self.callbacks.contains_key(&event)
    }

    /// Run the callback bound to `event`, if any. Returns whether one ran.
    pub fn dispatch(
        &mut self,
        event: InputEvent,
        context: &mut C,
        engine: &mut E,
        payload: &InputPayload,
    ) -> bool {
        match self.callbacks.get_mut(&event) {
            Some(callback) => {
                callback(context, engine, payload);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}
