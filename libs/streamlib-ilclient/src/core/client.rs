// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::core::component::{Component, ComponentId, ComponentShared, CreateFlags, ErrorMask};
use crate::core::config::IlClientConfig;
use crate::core::error::{IlError, Result};
use crate::core::events::{EventPool, EventPoolStats};
use crate::core::runtime::{EventSink, IlCore};
use crate::core::types::{Command, CommandKind, StateType};
use crate::core::waiter;
use crate::core::wake_signal::WakeBits;

/// Callback receiving the component and one event datum (error code, port
/// index or config index).
pub type EventCallback = Arc<dyn Fn(&ComponentShared, u32) + Send + Sync>;

/// Callback run after a buffer has been returned to the component's queue.
pub type BufferCallback = Arc<dyn Fn(&ComponentShared) + Send + Sync>;

#[derive(Default, Clone)]
pub(crate) struct Callbacks {
    pub(crate) port_settings: Option<EventCallback>,
    pub(crate) eos: Option<EventCallback>,
    pub(crate) error: Option<EventCallback>,
    pub(crate) config_changed: Option<EventCallback>,
    pub(crate) fill_buffer_done: Option<BufferCallback>,
    pub(crate) empty_buffer_done: Option<BufferCallback>,
}

/// State shared by every component of one client.
pub(crate) struct ClientShared {
    pub(crate) pool: EventPool,
    pub(crate) callbacks: RwLock<Callbacks>,
    pub(crate) config: IlClientConfig,
}

/// Owns the event pool and the user callbacks, and creates components on a
/// component runtime.
pub struct IlClient {
    shared: Arc<ClientShared>,
    core: Arc<dyn IlCore>,
    next_id: AtomicU32,
}

impl IlClient {
    pub fn new(core: Arc<dyn IlCore>) -> Self {
        Self::build(core, IlClientConfig::default())
    }

    pub fn with_config(core: Arc<dyn IlCore>, config: IlClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(core, config))
    }

    fn build(core: Arc<dyn IlCore>, config: IlClientConfig) -> Self {
        tracing::debug!(
            "IL client: event pool capacity {}, component prefix '{}'",
            config.event_pool_capacity,
            config.component_name_prefix
        );
        Self {
            shared: Arc::new(ClientShared {
                pool: EventPool::new(config.event_pool_capacity),
                callbacks: RwLock::new(Callbacks::default()),
                config,
            }),
            core,
            next_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &IlClientConfig {
        &self.shared.config
    }

    pub fn event_pool_stats(&self) -> EventPoolStats {
        self.shared.pool.stats()
    }

    pub fn set_port_settings_callback<F>(&self, callback: F)
    where
        F: Fn(&ComponentShared, u32) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().port_settings = Some(Arc::new(callback));
    }

    pub fn set_eos_callback<F>(&self, callback: F)
    where
        F: Fn(&ComponentShared, u32) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().eos = Some(Arc::new(callback));
    }

    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: Fn(&ComponentShared, u32) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().error = Some(Arc::new(callback));
    }

    pub fn set_config_changed_callback<F>(&self, callback: F)
    where
        F: Fn(&ComponentShared, u32) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().config_changed = Some(Arc::new(callback));
    }

    pub fn set_fill_buffer_done_callback<F>(&self, callback: F)
    where
        F: Fn(&ComponentShared) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().fill_buffer_done = Some(Arc::new(callback));
    }

    pub fn set_empty_buffer_done_callback<F>(&self, callback: F)
    where
        F: Fn(&ComponentShared) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().empty_buffer_done = Some(Arc::new(callback));
    }

    /// Create the component `name` on the runtime, which sees it as
    /// `<prefix><name>`.
    pub fn create_component(&self, name: &str, flags: CreateFlags) -> Result<Component> {
        let id = ComponentId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(ComponentShared::new(id, name, flags, Arc::clone(&self.shared)));
        self.shared.pool.lock().register(id);

        let prefix = &self.shared.config.component_name_prefix;
        let full_name = format!("{prefix}{name}");
        let handle = match self.core.get_handle(&full_name, EventSink::new(&shared)) {
            Ok(handle) => handle,
            Err(code) => {
                self.shared.pool.lock().unregister(id);
                tracing::warn!("Cannot create component '{}': {}", full_name, code);
                return Err(IlError::ComponentCreation {
                    name: full_name,
                    code,
                });
            }
        };

        if let Some(reported) = handle.component_name() {
            shared.rename(reported.strip_prefix(prefix.as_str()).unwrap_or(&reported));
        }

        let component = Component::new(shared, handle);
        component.apply_creation_flags()?;
        tracing::debug!("{}: created as {}", component.name(), id);
        Ok(component)
    }

    /// Move every component to `state`.
    ///
    /// Commands go out in random order unless disabled in the config, and all
    /// of them are sent before any completion is awaited. A transition to
    /// Loaded masks port-unpopulated errors for its duration. Every component
    /// that accepted the command is waited on even after a failure; the first
    /// failure is returned.
    pub fn state_transition(&self, components: &[&Component], state: StateType) -> Result<()> {
        let _guards: Vec<_> = if state == StateType::Loaded {
            components
                .iter()
                .map(|component| component.mask_errors_scoped(ErrorMask::UNPOPULATED))
                .collect()
        } else {
            Vec::new()
        };

        let mut order: Vec<usize> = (0..components.len()).collect();
        if self.shared.config.randomize_state_transitions {
            fastrand::shuffle(&mut order);
        }

        // A refused command stops further sends, but the components already
        // commanded are still waited on so their completions are consumed.
        let mut first_failure = None;
        let mut commanded = Vec::with_capacity(order.len());
        for &index in &order {
            let component = components[index];
            component.wake().clear(WakeBits::EVENT_ERROR);
            if let Err(err) = component.send_command(Command::StateSet(state)) {
                tracing::warn!("{}: {} not sent: {}", component.name(), state, err);
                first_failure = Some(err);
                break;
            }
            commanded.push(component);
        }

        for component in commanded {
            let outcome = waiter::wait_for_command_complete(component, CommandKind::StateSet, state.raw());
            if !outcome.is_completed() && first_failure.is_none() {
                first_failure = Some(IlError::CommandFailed {
                    component: component.name(),
                    command: CommandKind::StateSet,
                    data: state.raw(),
                });
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Release components, returning their queued events to the pool and
    /// freeing their runtime handles.
    pub fn cleanup_components(&self, components: Vec<Component>) {
        for component in components {
            drop(component);
        }
        tracing::debug!("Event pool after cleanup: {:?}", self.event_pool_stats());
    }
}

impl std::fmt::Debug for IlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IlClient")
            .field("pool", &self.shared.pool)
            .field("config", &self.shared.config)
            .finish()
    }
}
