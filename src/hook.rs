//! Layer hooks for activation capture
//!
//! A hook is a one-element mailbox attached to a single decoder layer:
//! the forward pass overwrites it every time that layer runs, and the
//! collector reads it out immediately after the pass. The registry is
//! owned by the model; registering returns a [`HookHandle`] that detaches
//! the hook on drop, so no hook survives the chunk that attached it even
//! when processing fails partway through.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use candle_core::Tensor;

type Slot = Rc<RefCell<Option<Tensor>>>;
type SlotMap = Rc<RefCell<HashMap<usize, Slot>>>;

/// Per-model registry of layer hooks.
///
/// The forward pass reports each decoder layer's output via [`record`];
/// layers without an attached hook cost nothing.
///
/// [`record`]: HookRegistry::record
#[derive(Debug, Default)]
pub struct HookRegistry {
    slots: SlotMap,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a hook to `layer`.
    ///
    /// Returns the reader end and the detach guard. At most one hook per
    /// layer may be attached at a time.
    pub fn register(&self, layer: usize) -> Result<(LayerHook, HookHandle)> {
        let mut slots = self.slots.borrow_mut();
        if slots.contains_key(&layer) {
            bail!("layer {layer} already has a hook attached");
        }
        let slot: Slot = Rc::new(RefCell::new(None));
        slots.insert(layer, Rc::clone(&slot));
        Ok((
            LayerHook { slot },
            HookHandle {
                slots: Rc::clone(&self.slots),
                layer,
            },
        ))
    }

    /// Store `output` in the slot for `layer`, overwriting any previous
    /// capture. No-op when no hook is attached to `layer`.
    ///
    /// Called by the forward pass after each decoder layer. The clone is
    /// shallow (tensor storage is refcounted).
    pub fn record(&self, layer: usize, output: &Tensor) {
        if let Some(slot) = self.slots.borrow().get(&layer) {
            *slot.borrow_mut() = Some(output.clone());
        }
    }

    /// Number of currently attached hooks.
    pub fn active(&self) -> usize {
        self.slots.borrow().len()
    }
}

/// Reader end of a hook.
#[derive(Debug)]
pub struct LayerHook {
    slot: Slot,
}

impl LayerHook {
    /// Move the most recent capture out of the slot, leaving it empty.
    ///
    /// The slot is overwritten on every forward pass, so the value must
    /// be taken before the next pass runs.
    pub fn take(&self) -> Option<Tensor> {
        self.slot.borrow_mut().take()
    }
}

/// Detach guard: removes its hook from the registry on drop.
///
/// Dropping the handle is the only way to deregister, which makes detach
/// symmetric with [`HookRegistry::register`] on every exit path.
#[derive(Debug)]
pub struct HookHandle {
    slots: SlotMap,
    layer: usize,
}

impl Drop for HookHandle {
    fn drop(&mut self) {
        self.slots.borrow_mut().remove(&self.layer);
    }
}
