//! Cooperative engine
//!
//! The engine hosts up to [`MAX_STACKS`] stack instances. Each one owns its
//! regional plan, its service table, its radio arbiter and its event queue,
//! and borrows the radio it drives. An external superloop calls [`Engine::run`]
//! for every stack and sleeps at most the returned delay; interrupt handlers
//! only call [`Engine::signal_irq`].
//!
//! A run pass:
//! 1. Processes a pending interrupt: the radio completion is collected, the
//!    arbiter released, a received frame offered to the services then queued
//!    as an event if nobody claimed it, and the owner's `on_update` called.
//! 2. Aborts a radio operation older than the watchdog limit.
//! 3. Launches at most one due task, and only while the radio is free.
//! 4. Computes the delay before the next pass.

/// Millisecond time base
pub mod clock;
/// Modem events
pub mod event;
mod stack;

pub use clock::Clock;
pub use event::{EventQueue, ModemEvent};

use core::sync::atomic::Ordering;

use stack::StackInstance;

use crate::config::{EngineConfig, StackConfig, MAX_STACKS};
use crate::radio::traits::Radio;
use crate::region::{RegionError, RegionPlan};
use crate::service::{RegistryError, Service, ServiceHandle, ServiceId};

/// Callback invoked after a run pass queued events
pub type EventHook = fn();

/// Engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// `init_common` was not called
    NotInitialized,
    /// `init_common` called twice
    AlreadyInitialized,
    /// Stack identifier out of range or not initialized
    UnknownStack,
    /// Stack identifier already initialized
    StackAlreadyInitialized,
    /// Service registry error
    Registry(RegistryError),
    /// Region error
    Region(RegionError),
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        EngineError::Registry(err)
    }
}

impl From<RegionError> for EngineError {
    fn from(err: RegionError) -> Self {
        EngineError::Region(err)
    }
}

/// Engine hosting the stack instances
pub struct Engine<'a, C: Clock, R: Radio> {
    clock: C,
    config: EngineConfig,
    initialized: bool,
    event_hook: Option<EventHook>,
    stacks: [Option<StackInstance<'a, R>>; MAX_STACKS],
}

impl<'a, C: Clock, R: Radio> Engine<'a, C, R> {
    /// Create an engine; `init_common` must be called before any stack
    pub fn new(clock: C, config: EngineConfig) -> Self {
        Self {
            clock,
            config,
            initialized: false,
            event_hook: None,
            stacks: core::array::from_fn(|_| None),
        }
    }

    /// One-time initialization shared by all stacks
    pub fn init_common(&mut self, event_hook: Option<EventHook>) -> Result<(), EngineError> {
        if self.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        self.initialized = true;
        self.event_hook = event_hook;
        info!("engine initialized, {} stacks", MAX_STACKS);
        Ok(())
    }

    /// Initialize stack `stack_id`
    pub fn init(&mut self, stack_id: u8, config: StackConfig) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        let slot = self
            .stacks
            .get_mut(stack_id as usize)
            .ok_or(EngineError::UnknownStack)?;
        if slot.is_some() {
            return Err(EngineError::StackAlreadyInitialized);
        }
        *slot = Some(StackInstance::new(stack_id, config));
        info!("stack {} initialized", stack_id);
        Ok(())
    }

    /// Return to the state before `init_common`, dropping every stack
    pub fn shutdown(&mut self) {
        for slot in self.stacks.iter_mut() {
            *slot = None;
        }
        self.initialized = false;
        self.event_hook = None;
    }

    /// Whether `init_common` was called
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Time base of the engine
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one scheduling pass of `stack_id`, returns the delay in
    /// milliseconds before `run` must be called again
    pub fn run(&mut self, stack_id: u8) -> Result<u32, EngineError> {
        let now_ms = self.clock.now_ms();
        let config = self.config;
        let hook = self.event_hook;
        let stack = self.stack_mut(stack_id)?;
        let delay = stack.run(now_ms, &config);
        if stack.events.take_raised() {
            if let Some(hook) = hook {
                hook();
            }
        }
        trace!("stack {}: next run in {} ms", stack_id, delay);
        Ok(delay)
    }

    /// Record a radio interrupt for `stack_id`
    pub fn signal_irq(&self, stack_id: u8) -> Result<(), EngineError> {
        self.stack(stack_id)?.irq_pending.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether an interrupt is waiting to be processed by `run`
    pub fn irq_pending(&self, stack_id: u8) -> Result<bool, EngineError> {
        Ok(self.stack(stack_id)?.irq_pending.load(Ordering::Acquire))
    }

    /// Attach the radio driven by `stack_id`
    pub fn set_radio_context(&mut self, stack_id: u8, radio: &'a mut R) -> Result<(), EngineError> {
        self.stack_mut(stack_id)?.radio = Some(radio);
        Ok(())
    }

    /// Radio driven by `stack_id`
    pub fn get_radio_context(&self, stack_id: u8) -> Result<Option<&R>, EngineError> {
        Ok(self.stack(stack_id)?.radio.as_deref())
    }

    /// Mutable radio driven by `stack_id`
    pub fn radio_context_mut(&mut self, stack_id: u8) -> Result<Option<&mut R>, EngineError> {
        Ok(self.stack_mut(stack_id)?.radio.as_deref_mut())
    }

    /// Snapshot of the radio ownership of `stack_id`
    pub fn radio_is_free(&self, stack_id: u8) -> Result<bool, EngineError> {
        Ok(self.stack(stack_id)?.arbiter.is_free())
    }

    /// Register a service on `stack_id`; allowed until its first run
    pub fn register_service(
        &mut self,
        stack_id: u8,
        task_id: u8,
        service: &'a mut dyn Service,
    ) -> Result<ServiceHandle, EngineError> {
        Ok(self.stack_mut(stack_id)?.services.init(task_id, service)?)
    }

    /// Enable or disable a service
    pub fn set_service_enabled(
        &mut self,
        stack_id: u8,
        service_id: ServiceId,
        enabled: bool,
    ) -> Result<(), EngineError> {
        Ok(self.stack_mut(stack_id)?.services.set_enabled(service_id, enabled)?)
    }

    /// Schedule the service's task for the next run pass
    pub fn add_task(&mut self, stack_id: u8, service_id: ServiceId) -> Result<(), EngineError> {
        self.add_task_in(stack_id, service_id, 0)
    }

    /// Schedule the service's task `delay_ms` from now, capped at
    /// [`clock::MAX_DELAY_MS`]
    pub fn add_task_in(
        &mut self,
        stack_id: u8,
        service_id: ServiceId,
        delay_ms: u32,
    ) -> Result<(), EngineError> {
        let due_ms = self.clock.now_ms().wrapping_add(delay_ms.min(clock::MAX_DELAY_MS));
        Ok(self.stack_mut(stack_id)?.services.add_task(service_id, due_ms)?)
    }

    /// Cancel the service's pending task
    pub fn remove_task(&mut self, stack_id: u8, service_id: ServiceId) -> Result<(), EngineError> {
        Ok(self.stack_mut(stack_id)?.services.remove_task(service_id)?)
    }

    /// Oldest queued event of `stack_id`
    pub fn get_event(&mut self, stack_id: u8) -> Result<Option<ModemEvent>, EngineError> {
        Ok(self.stack_mut(stack_id)?.events.pop())
    }

    /// Events dropped because the queue of `stack_id` was full
    pub fn missed_events(&self, stack_id: u8) -> Result<u16, EngineError> {
        Ok(self.stack(stack_id)?.events.missed())
    }

    /// Regional plan of `stack_id`
    pub fn region(&self, stack_id: u8) -> Result<&RegionPlan, EngineError> {
        Ok(&self.stack(stack_id)?.region)
    }

    /// Mutable regional plan of `stack_id`
    pub fn region_mut(&mut self, stack_id: u8) -> Result<&mut RegionPlan, EngineError> {
        Ok(&mut self.stack_mut(stack_id)?.region)
    }

    /// Configuration of `stack_id`
    pub fn stack_config(&self, stack_id: u8) -> Result<&StackConfig, EngineError> {
        Ok(&self.stack(stack_id)?.config)
    }

    fn stack(&self, stack_id: u8) -> Result<&StackInstance<'a, R>, EngineError> {
        self.stacks
            .get(stack_id as usize)
            .and_then(Option::as_ref)
            .ok_or(EngineError::UnknownStack)
    }

    fn stack_mut(&mut self, stack_id: u8) -> Result<&mut StackInstance<'a, R>, EngineError> {
        self.stacks
            .get_mut(stack_id as usize)
            .and_then(Option::as_mut)
            .ok_or(EngineError::UnknownStack)
    }
}
