//! Fixed capacity table of the services of one stack
//!
//! Services are registered in order and identified by their index. They are
//! never removed, only enabled or disabled. Registration closes when the
//! engine first runs the stack.

use heapless::Vec;

use super::{DownlinkFrame, Service, ServiceId};
use crate::config::MAX_SERVICES;
use crate::engine::clock::until_ms;

/// Registry error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// Service table is full
    Full,
    /// Registration after the stack started running
    Sealed,
    /// Task identifier already registered
    DuplicateTask,
    /// No service with this identifier
    UnknownService,
}

/// Identifiers of a registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceHandle {
    /// Registry index
    pub service_id: ServiceId,
    /// Task identifier given at registration
    pub task_id: u8,
}

pub(crate) struct ServiceSlot<'a> {
    pub(crate) service_id: ServiceId,
    pub(crate) task_id: u8,
    pub(crate) enabled: bool,
    pub(crate) initialized: bool,
    pub(crate) due_ms: Option<u32>,
    pub(crate) service: &'a mut dyn Service,
}

/// Services of one stack
pub struct ServiceRegistry<'a> {
    slots: Vec<ServiceSlot<'a>, MAX_SERVICES>,
    sealed: bool,
}

impl<'a> ServiceRegistry<'a> {
    /// Create an empty, open registry
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            sealed: false,
        }
    }

    /// Register `service` under `task_id`; it starts enabled with no task due
    pub fn init(
        &mut self,
        task_id: u8,
        service: &'a mut dyn Service,
    ) -> Result<ServiceHandle, RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed);
        }
        if self.slots.iter().any(|slot| slot.task_id == task_id) {
            return Err(RegistryError::DuplicateTask);
        }
        let service_id = self.slots.len() as ServiceId;
        self.slots
            .push(ServiceSlot {
                service_id,
                task_id,
                enabled: true,
                initialized: false,
                due_ms: None,
                service,
            })
            .map_err(|_| RegistryError::Full)?;
        debug!("registry: service {} registered for task {}", service_id, task_id);
        Ok(ServiceHandle { service_id, task_id })
    }

    /// Close registration
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether registration is closed
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no service is registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Enable or disable a service; a disabled service keeps its task but is
    /// neither launched nor offered frames
    pub fn set_enabled(
        &mut self,
        service_id: ServiceId,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        self.slot_mut(service_id)?.enabled = enabled;
        Ok(())
    }

    /// Whether a service is enabled
    pub fn is_enabled(&self, service_id: ServiceId) -> Result<bool, RegistryError> {
        self.slot(service_id).map(|slot| slot.enabled)
    }

    /// Whether a service has been launched at least once
    pub fn is_initialized(&self, service_id: ServiceId) -> Result<bool, RegistryError> {
        self.slot(service_id).map(|slot| slot.initialized)
    }

    /// Make the service's task due at `due_ms`, replacing any pending one
    pub fn add_task(&mut self, service_id: ServiceId, due_ms: u32) -> Result<(), RegistryError> {
        self.slot_mut(service_id)?.due_ms = Some(due_ms);
        Ok(())
    }

    /// Cancel the service's pending task
    pub fn remove_task(&mut self, service_id: ServiceId) -> Result<(), RegistryError> {
        self.slot_mut(service_id)?.due_ms = None;
        Ok(())
    }

    /// Due time of the service's pending task
    pub fn due_ms(&self, service_id: ServiceId) -> Result<Option<u32>, RegistryError> {
        self.slot(service_id).map(|slot| slot.due_ms)
    }

    /// Earliest pending task of an enabled service and its signed distance
    /// from `now_ms`; ties go to the first registered
    pub fn next_task(&self, now_ms: u32) -> Option<(ServiceId, i32)> {
        let mut next: Option<(ServiceId, i32)> = None;
        for slot in self.slots.iter().filter(|slot| slot.enabled) {
            if let Some(due) = slot.due_ms {
                let until = until_ms(due, now_ms);
                if next.map_or(true, |(_, best)| until < best) {
                    next = Some((slot.service_id, until));
                }
            }
        }
        next
    }

    /// Offer `frame` to enabled services in registration order; the first
    /// claim stops the dispatch
    pub fn dispatch_downlink(&mut self, frame: &DownlinkFrame) -> Option<ServiceId> {
        for slot in self.slots.iter_mut().filter(|slot| slot.enabled) {
            if slot.service.on_downlink(frame) {
                trace!("registry: downlink claimed by service {}", slot.service_id);
                return Some(slot.service_id);
            }
        }
        None
    }

    fn slot(&self, service_id: ServiceId) -> Result<&ServiceSlot<'a>, RegistryError> {
        self.slots
            .get(service_id as usize)
            .ok_or(RegistryError::UnknownService)
    }

    pub(crate) fn slot_mut(
        &mut self,
        service_id: ServiceId,
    ) -> Result<&mut ServiceSlot<'a>, RegistryError> {
        self.slots
            .get_mut(service_id as usize)
            .ok_or(RegistryError::UnknownService)
    }
}

impl<'a> Default for ServiceRegistry<'a> {
    fn default() -> Self {
        Self::new()
    }
}
